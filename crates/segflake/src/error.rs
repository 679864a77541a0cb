#[cfg(feature = "segment")]
use crate::provider::ProviderError;

/// A result type defaulting to the crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors `segflake` surfaces to its callers.
///
/// Construction-time failures ([`Error::InvalidConfiguration`]) abort
/// initialisation. Everything else is scoped to the single call that produced
/// it: the generator stays usable afterwards and nothing is retried
/// internally.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A worker or datacenter id is out of range, a business key mapping is
    /// missing, a step is not positive, or similar.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// A per-call argument was rejected (e.g. an empty prefix).
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The clock reports a time earlier than the last issued timestamp (or
    /// earlier than the generator's epoch). No id was produced.
    #[error("clock moved backwards: now {now} ms is behind last timestamp {last_timestamp} ms")]
    ClockMovedBackwards { last_timestamp: u64, now: u64 },

    /// The segment provider could not advance the shared counter.
    #[cfg_attr(docsrs, doc(cfg(feature = "segment")))]
    #[cfg(feature = "segment")]
    #[error("failed to allocate a segment for business key `{biz_key}`")]
    SegmentAllocationFailed {
        biz_key: String,
        #[source]
        source: ProviderError,
    },

    /// No ring buffer is configured for the requested business key.
    #[error("no segment buffer is configured for business key `{biz_key}`")]
    UnknownBusinessKey { biz_key: String },
}

impl Error {
    pub(crate) fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}
