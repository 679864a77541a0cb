use std::sync::Arc;

use crate::{IdSegment, ProviderError};

/// Leases ranges of ids from a counter shared by every process in the
/// fleet.
///
/// Each call atomically advances the counter for `biz_key` and returns the
/// range it moved over. Implementations must never return overlapping ranges
/// for the same key, across threads or across processes. They are called
/// from caller threads and from refill pool threads alike.
pub trait SegmentProvider: Send + Sync {
    /// Leases the next segment for `biz_key`.
    ///
    /// # Errors
    ///
    /// Any [`ProviderError`]; the caller decides whether it is fatal.
    fn next_segment(&self, biz_key: &str) -> Result<IdSegment, ProviderError>;
}

impl<P: SegmentProvider + ?Sized> SegmentProvider for Arc<P> {
    fn next_segment(&self, biz_key: &str) -> Result<IdSegment, ProviderError> {
        (**self).next_segment(biz_key)
    }
}

impl<P: SegmentProvider + ?Sized> SegmentProvider for Box<P> {
    fn next_segment(&self, biz_key: &str) -> Result<IdSegment, ProviderError> {
        (**self).next_segment(biz_key)
    }
}
