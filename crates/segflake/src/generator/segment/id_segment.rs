use portable_atomic::{AtomicI64, AtomicU64, Ordering};

use crate::ProviderError;

/// One leased range of ids, `[min, max)`, with a cursor.
///
/// Segments are produced by a [`SegmentProvider`] and then owned by a single
/// [`RingBuffer`] slot. The cursor only ever moves forward, and
/// [`IdSegment::get_and_increment`] hands out every value in the range exactly
/// once no matter how many threads race on it.
///
/// `update_time` and `next_ready_time` are zero until the segment is placed in
/// a buffer; see [`IdSegment::mark_filled`].
///
/// [`SegmentProvider`]: crate::SegmentProvider
/// [`RingBuffer`]: crate::RingBuffer
#[derive(Debug)]
pub struct IdSegment {
    min: i64,
    max: i64,
    #[cfg(feature = "cache-padded")]
    current: crossbeam_utils::CachePadded<AtomicI64>,
    #[cfg(not(feature = "cache-padded"))]
    current: AtomicI64,
    update_time: AtomicU64,
    next_ready_time: AtomicU64,
}

impl IdSegment {
    /// Creates the segment `[min, max)`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRange`] unless `min < max`.
    pub fn new(min: i64, max: i64) -> Result<Self, ProviderError> {
        if min >= max {
            return Err(ProviderError::InvalidRange {
                reason: format!("segment [{min}, {max}) is empty"),
            });
        }
        Ok(Self {
            min,
            max,
            #[cfg(feature = "cache-padded")]
            current: crossbeam_utils::CachePadded::new(AtomicI64::new(min)),
            #[cfg(not(feature = "cache-padded"))]
            current: AtomicI64::new(min),
            update_time: AtomicU64::new(0),
            next_ready_time: AtomicU64::new(0),
        })
    }

    /// Creates the segment `[min, min + step)`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRange`] if `step` is not positive or
    /// the upper bound overflows.
    pub fn with_step(min: i64, step: i64) -> Result<Self, ProviderError> {
        let max = min
            .checked_add(step)
            .ok_or_else(|| ProviderError::InvalidRange {
                reason: format!("segment starting at {min} with step {step} overflows"),
            })?;
        Self::new(min, max)
    }

    /// Inclusive lower bound.
    pub const fn min(&self) -> i64 {
        self.min
    }

    /// Exclusive upper bound.
    pub const fn max(&self) -> i64 {
        self.max
    }

    pub const fn step(&self) -> i64 {
        self.max - self.min
    }

    /// The next value that would be handed out (`max` once exhausted).
    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> i64 {
        self.max - self.current()
    }

    /// Takes the next value, or `None` when the segment is exhausted.
    pub fn get_and_increment(&self) -> Option<i64> {
        self.current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max).then_some(current + 1)
            })
            .ok()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current() >= self.max
    }

    /// Whether more than `threshold` (a fraction in `(0, 1]`) of the range has
    /// been handed out.
    #[allow(clippy::cast_precision_loss)]
    pub fn is_almost_exhausted(&self, threshold: f64) -> bool {
        let used = (self.current() - self.min) as f64;
        used / self.step() as f64 > threshold
    }

    /// Millis at which the segment was placed in a buffer, `0` if never.
    pub fn update_time(&self) -> u64 {
        self.update_time.load(Ordering::Acquire)
    }

    /// Earliest millis at which consuming this segment may trigger a
    /// background refill.
    pub fn next_ready_time(&self) -> u64 {
        self.next_ready_time.load(Ordering::Acquire)
    }

    /// Whether the segment has been stamped by [`IdSegment::mark_filled`].
    pub fn is_ready(&self) -> bool {
        self.update_time() != 0
    }

    /// Stamps the segment as placed in a buffer at `now`, holding off
    /// background refills until `now + cooldown_millis`.
    pub fn mark_filled(&self, now: u64, cooldown_millis: u64) {
        // zero is reserved for "never filled"
        self.update_time.store(now.max(1), Ordering::Release);
        self.next_ready_time
            .store(now.saturating_add(cooldown_millis), Ordering::Release);
    }
}
