use core::time::Duration;
use std::{collections::BTreeMap, sync::Arc};

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{RefillPool, buffer::RefillTicket};
use crate::{
    BufferStats, Error, IdGenerator, IdSegment, Result, RingBuffer, SegmentConfig,
    SegmentProvider, SystemClock, TimeSource,
};

const PRELOADED_SEGMENTS: usize = 2;

/// State shared between callers and the background refill tasks.
struct Inner<P, T>
where
    P: ?Sized,
{
    provider: Arc<P>,
    time: T,
    buffers: BTreeMap<String, Arc<RingBuffer>>,
    default_biz_key: String,
    threshold: f64,
    cooldown_millis: u64,
}

/// A segment (number-range) ID generator with a double buffer per business
/// key.
///
/// Every configured business key owns a [`RingBuffer`] holding two
/// [`IdSegment`]s leased from a [`SegmentProvider`]. Ids are handed out from
/// the current segment without touching the provider. Once more than
/// `almost_exhausted_threshold` of it is used, a background task on the
/// refill pool leases a fresh standby segment so that the switch at
/// exhaustion costs nothing. If the standby is not ready by then, the caller
/// that hits exhaustion fetches one synchronously; concurrent callers on the
/// same key wait for that single fetch instead of issuing their own.
///
/// Within a business key, ids are unique and increase with each segment, but
/// concurrent callers may observe them out of arrival order. Ids are not
/// ordered across keys.
///
/// ## Failure
///
/// A provider failure on the synchronous path surfaces as
/// [`Error::SegmentAllocationFailed`] to the caller whose request needed the
/// segment. A failure in a background refill is only logged; the next
/// exhaustion then takes the synchronous path.
///
/// Dropping the generator shuts the refill pool down and waits for queued
/// refills to finish.
pub struct SegmentIdGenerator<P = dyn SegmentProvider, T = SystemClock>
where
    P: SegmentProvider + ?Sized,
    T: TimeSource,
{
    inner: Arc<Inner<P, T>>,
    pool: RefillPool,
}

impl<P, T> SegmentIdGenerator<P, T>
where
    P: SegmentProvider + ?Sized + 'static,
    T: TimeSource + Send + Sync + 'static,
{
    /// Builds a buffer for every key in `config.biz_keys` and preloads both
    /// of its slots from `provider`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if `config` does not validate or the
    ///   refill pool cannot start.
    /// - [`Error::SegmentAllocationFailed`] if a preload fails while
    ///   `config.require_preload` is set. Without it the failure is logged and
    ///   the key starts cold, fetching on its first request.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use segflake::{
    ///     CounterSegmentProvider, MemoryCounterStore, SegmentConfig, SegmentIdGenerator,
    ///     SystemClock,
    /// };
    ///
    /// let provider = CounterSegmentProvider::new(MemoryCounterStore::new(), 100)?;
    /// let config = SegmentConfig {
    ///     biz_keys: vec!["order".into()],
    ///     default_biz_key: "order".into(),
    ///     ..SegmentConfig::default()
    /// };
    /// let generator = SegmentIdGenerator::new(Arc::new(provider), &config, SystemClock)?;
    /// assert_eq!(generator.generate_long_id_for("order")?, 1);
    /// assert_eq!(generator.generate_long_id_for("order")?, 2);
    /// # Ok::<(), segflake::Error>(())
    /// ```
    pub fn new(provider: Arc<P>, config: &SegmentConfig, time: T) -> Result<Self> {
        config.validate()?;

        let pool = RefillPool::new(
            config.core_pool_size,
            config.max_pool_size,
            Duration::from_secs(config.keep_alive_seconds),
            config.queue_capacity,
        )
        .map_err(|e| Error::invalid_configuration(format!("failed to start refill pool: {e}")))?;

        let inner = Inner {
            provider,
            time,
            buffers: config
                .biz_keys
                .iter()
                .map(|key| (key.clone(), Arc::new(RingBuffer::new())))
                .collect(),
            default_biz_key: config.default_biz_key.clone(),
            threshold: config.almost_exhausted_threshold,
            cooldown_millis: config.preload_interval_millis,
        };

        for (biz_key, buffer) in &inner.buffers {
            inner.preload(biz_key, buffer, config.require_preload)?;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            biz_keys = ?config.biz_keys,
            default_biz_key = %config.default_biz_key,
            threshold = config.almost_exhausted_threshold,
            "segment generator initialised"
        );

        Ok(Self {
            inner: Arc::new(inner),
            pool,
        })
    }

    /// Generates the next id for `biz_key`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `biz_key` is empty.
    /// - [`Error::UnknownBusinessKey`] if no buffer exists for `biz_key`.
    /// - [`Error::SegmentAllocationFailed`] if a synchronous provider fetch
    ///   was needed and failed.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn generate_long_id_for(&self, biz_key: &str) -> Result<i64> {
        let buffer = self.inner.buffer(biz_key)?;
        loop {
            let Some(segment) = buffer.current_segment() else {
                self.inner.fill_empty_current(biz_key, buffer)?;
                continue;
            };

            if let Some(id) = segment.get_and_increment() {
                self.maybe_schedule_refill(biz_key, buffer, &segment);
                return Ok(id);
            }

            self.inner.switch_exhausted(biz_key, buffer, &segment)?;
        }
    }

    /// Decimal rendering of [`SegmentIdGenerator::generate_long_id_for`].
    ///
    /// # Errors
    ///
    /// Same as [`SegmentIdGenerator::generate_long_id_for`].
    pub fn generate_string_id_for(&self, biz_key: &str) -> Result<String> {
        self.generate_long_id_for(biz_key).map(|id| id.to_string())
    }

    /// Schedules a background refill of the standby slot once `segment` is
    /// past the threshold and its cooldown, unless the standby is already
    /// fresh or a refill is pending.
    fn maybe_schedule_refill(&self, biz_key: &str, buffer: &Arc<RingBuffer>, segment: &IdSegment) {
        if !segment.is_almost_exhausted(self.inner.threshold)
            || self.inner.time.current_millis() < segment.next_ready_time()
            || !buffer.standby_needs_refill()
        {
            return;
        }

        let Some(ticket) = RefillTicket::claim(buffer) else {
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(biz_key, "scheduling standby segment refill");

        let inner = Arc::clone(&self.inner);
        let biz_key = biz_key.to_owned();
        self.pool
            .execute(move || inner.refill_standby(&biz_key, ticket.buffer()));
    }
}

impl<P, T> SegmentIdGenerator<P, T>
where
    P: SegmentProvider + ?Sized,
    T: TimeSource,
{
    /// The configured business keys, in sorted order.
    pub fn biz_keys(&self) -> impl Iterator<Item = &str> {
        self.inner.buffers.keys().map(String::as_str)
    }

    /// The key used by the keyless [`IdGenerator`] methods.
    pub fn default_biz_key(&self) -> &str {
        &self.inner.default_biz_key
    }

    /// A snapshot of `biz_key`'s buffer, `None` for unknown keys.
    pub fn stats(&self, biz_key: &str) -> Option<BufferStats> {
        self.inner.buffers.get(biz_key).map(|buffer| buffer.stats())
    }

    /// The refill pool shared by all keys.
    pub const fn pool(&self) -> &RefillPool {
        &self.pool
    }
}

impl<P, T> Inner<P, T>
where
    P: SegmentProvider + ?Sized,
    T: TimeSource,
{
    fn buffer(&self, biz_key: &str) -> Result<&Arc<RingBuffer>> {
        if biz_key.is_empty() {
            return Err(Error::invalid_argument("business key must not be empty"));
        }
        self.buffers
            .get(biz_key)
            .ok_or_else(|| Error::UnknownBusinessKey {
                biz_key: biz_key.to_owned(),
            })
    }

    /// Leases one segment and stamps it as filled now.
    fn fetch(&self, biz_key: &str) -> Result<IdSegment> {
        let segment =
            self.provider
                .next_segment(biz_key)
                .map_err(|source| Error::SegmentAllocationFailed {
                    biz_key: biz_key.to_owned(),
                    source,
                })?;
        segment.mark_filled(self.time.current_millis(), self.cooldown_millis);
        Ok(segment)
    }

    fn preload(&self, biz_key: &str, buffer: &RingBuffer, required: bool) -> Result<()> {
        for pos in 0..PRELOADED_SEGMENTS {
            match self.fetch(biz_key) {
                Ok(segment) => buffer.fill_segment(pos, segment),
                Err(e) if required => return Err(e),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        biz_key,
                        pos,
                        error = %_e,
                        "segment preload failed, key starts cold"
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    /// Fills the current slot of a buffer that has never been filled.
    #[cold]
    #[inline(never)]
    fn fill_empty_current(&self, biz_key: &str, buffer: &RingBuffer) -> Result<()> {
        let _fetch = buffer.lock_fetch();
        if buffer.current_segment().is_some() {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(biz_key, "current segment empty, fetching synchronously");
        buffer.fill_current(self.fetch(biz_key)?);
        Ok(())
    }

    /// Moves `buffer` off the exhausted segment, fetching a standby first if
    /// there is no usable one. Callers that lose the race find the buffer
    /// already switched and simply retry.
    #[cold]
    #[inline(never)]
    fn switch_exhausted(
        &self,
        biz_key: &str,
        buffer: &RingBuffer,
        exhausted: &Arc<IdSegment>,
    ) -> Result<()> {
        let _fetch = buffer.lock_fetch();
        if !buffer.is_current(exhausted) {
            return Ok(());
        }

        let standby_usable = buffer
            .next_segment()
            .is_some_and(|standby| standby.is_ready() && !standby.is_exhausted());
        if !standby_usable {
            #[cfg(feature = "tracing")]
            tracing::warn!(biz_key, "standby segment not ready, fetching synchronously");
            buffer.fill_standby(self.fetch(biz_key)?);
        }

        buffer.switch_segment();
        Ok(())
    }

    /// Body of a background refill task.
    fn refill_standby(&self, biz_key: &str, buffer: &RingBuffer) {
        let _fetch = buffer.lock_fetch();
        if !buffer.standby_needs_refill() {
            return;
        }

        match self.fetch(biz_key) {
            Ok(segment) => buffer.fill_standby(segment),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(biz_key, error = %_e, "background segment refill failed");
            }
        }
    }
}

impl<P, T> IdGenerator for SegmentIdGenerator<P, T>
where
    P: SegmentProvider + ?Sized + 'static,
    T: TimeSource + Send + Sync + 'static,
{
    /// Generates an id for the default business key.
    fn generate_long_id(&self) -> Result<i64> {
        self.generate_long_id_for(&self.inner.default_biz_key)
    }
}

impl<P, T> core::fmt::Debug for SegmentIdGenerator<P, T>
where
    P: SegmentProvider + ?Sized,
    T: TimeSource,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SegmentIdGenerator")
            .field("biz_keys", &self.inner.buffers.keys().collect::<Vec<_>>())
            .field("default_biz_key", &self.inner.default_biz_key)
            .field("threshold", &self.inner.threshold)
            .field("cooldown_millis", &self.inner.cooldown_millis)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
