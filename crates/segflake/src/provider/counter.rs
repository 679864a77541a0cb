//! Segment leasing on top of an atomic key-value counter.

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, IdSegment, ProviderError, Result, SegmentProvider};

/// Prefix of every counter key, followed by the business key.
pub const COUNTER_KEY_PREFIX: &str = "distributed_id:segment:";

/// A shared integer counter store, e.g. Redis.
pub trait CounterStore: Send + Sync {
    /// Atomically adds `delta` to `key` (missing keys count as zero) and
    /// returns the new value.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] on store failure.
    fn incr_by(&self, key: &str, delta: i64) -> Result<i64, ProviderError>;

    /// Sets `key` to `value` unless it exists. Returns whether it was set.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] on store failure.
    fn set_if_absent(&self, key: &str, value: i64) -> Result<bool, ProviderError>;
}

impl<C: CounterStore + ?Sized> CounterStore for std::sync::Arc<C> {
    fn incr_by(&self, key: &str, delta: i64) -> Result<i64, ProviderError> {
        (**self).incr_by(key, delta)
    }

    fn set_if_absent(&self, key: &str, value: i64) -> Result<bool, ProviderError> {
        (**self).set_if_absent(key, value)
    }
}

/// A [`SegmentProvider`] that leases `step` ids per atomic increment.
///
/// Incrementing the counter for a key to `n` yields the segment
/// `[n - step + 1, n + 1)`. A fresh counter starts at zero, so the first
/// segment begins at 1 unless [`CounterSegmentProvider::init_segment`] seeded
/// it.
#[derive(Debug)]
pub struct CounterSegmentProvider<C> {
    store: C,
    step: i64,
}

impl<C> CounterSegmentProvider<C>
where
    C: CounterStore,
{
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `step` is not positive.
    pub fn new(store: C, step: i64) -> Result<Self> {
        if step <= 0 {
            return Err(Error::invalid_configuration(format!(
                "segment step must be positive, got {step}"
            )));
        }
        Ok(Self { store, step })
    }

    pub const fn step(&self) -> i64 {
        self.step
    }

    pub const fn store(&self) -> &C {
        &self.store
    }

    /// The store key holding `biz_key`'s counter.
    pub fn counter_key(biz_key: &str) -> String {
        format!("{COUNTER_KEY_PREFIX}{biz_key}")
    }

    /// Seeds `biz_key`'s counter with `initial` unless it already exists, so
    /// the first segment starts at `initial + 1`. Returns whether it was
    /// seeded.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] on store failure.
    pub fn init_segment(&self, biz_key: &str, initial: i64) -> Result<bool, ProviderError> {
        let seeded = self
            .store
            .set_if_absent(&Self::counter_key(biz_key), initial)?;
        #[cfg(feature = "tracing")]
        tracing::info!(biz_key, initial, seeded, "initialised segment counter");
        Ok(seeded)
    }
}

impl<C> SegmentProvider for CounterSegmentProvider<C>
where
    C: CounterStore,
{
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    fn next_segment(&self, biz_key: &str) -> Result<IdSegment, ProviderError> {
        let new_max = self
            .store
            .incr_by(&Self::counter_key(biz_key), self.step)?;

        let (Some(min), Some(max)) = (new_max.checked_sub(self.step - 1), new_max.checked_add(1))
        else {
            return Err(ProviderError::InvalidRange {
                reason: format!("counter `{biz_key}` at {new_max} is out of range"),
            });
        };
        let segment = IdSegment::new(min, max)?;

        #[cfg(feature = "tracing")]
        tracing::info!(biz_key, min, max, "leased segment from counter");
        Ok(segment)
    }
}
