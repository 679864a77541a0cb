/// Why a [`SegmentProvider`] could not lease a segment.
///
/// [`SegmentProvider`]: crate::SegmentProvider
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// Another writer advanced the counter between our read and our
    /// conditional write.
    #[error("optimistic lock conflict on `{biz_key}`: max_id is no longer {expected}")]
    Conflict { biz_key: String, expected: i64 },

    /// The store has no counter for the business key.
    #[error("no segment counter exists for business key `{biz_key}`")]
    MissingKey { biz_key: String },

    /// The counter produced a range that cannot be served.
    #[error("invalid segment range: {reason}")]
    InvalidRange { reason: String },

    /// The backing store failed (connection, transaction, protocol...).
    #[error("segment store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl ProviderError {
    /// Wraps any store error.
    pub fn store(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Store(error.into())
    }

    /// Whether retrying the same call may succeed.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
