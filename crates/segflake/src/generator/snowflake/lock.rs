use core::time::Duration;

use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    DEFAULT_EPOCH, Error, IdGenerator, MAX_DATACENTER_ID, MAX_WORKER_ID, Result, SnowflakeId,
    SystemClock, TimeSource, WorkerIdAssigner, validate_worker_identity,
};

// The assigner's range check must agree with the id layout.
const _: () = assert!(MAX_DATACENTER_ID as u64 == SnowflakeId::DATACENTER_ID_MASK);
const _: () = assert!(MAX_WORKER_ID as u64 == SnowflakeId::WORKER_ID_MASK);

#[derive(Debug, Default)]
struct State {
    /// Absolute wall-clock millis of the last issued id.
    last_timestamp: Option<u64>,
    sequence: u64,
}

/// A lock-based Snowflake ID generator suitable for multi-threaded
/// environments.
///
/// Every request runs inside one critical section: the clock is read, the
/// sequence advanced, and the id packed while the mutex is held. Within a
/// process ids are therefore strictly increasing as long as the clock does
/// not move backwards. When it does, the request fails with
/// [`Error::ClockMovedBackwards`] instead of reusing the last timestamp; the
/// generator recovers on its own once the clock catches up.
///
/// At most 4096 ids are issued per millisecond. The 4097th request in the same
/// millisecond busy-waits for the clock to tick.
///
/// ## See Also
/// - [`SnowflakeId`] for the bit layout
/// - [`WorkerIdAssigner`] for where the worker identity comes from
pub struct SnowflakeIdGenerator<T = SystemClock>
where
    T: TimeSource,
{
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<Mutex<State>>,
    #[cfg(not(feature = "cache-padded"))]
    state: Mutex<State>,
    datacenter_id: u64,
    worker_id: u64,
    epoch: u64,
    time: T,
}

impl<T> SnowflakeIdGenerator<T>
where
    T: TimeSource,
{
    /// Creates a generator for the identity supplied by `assigner`, using
    /// [`DEFAULT_EPOCH`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either id is outside
    /// `[0, 31]`.
    ///
    /// # Example
    /// ```
    /// use segflake::{SnowflakeIdGenerator, StaticWorkerIdAssigner, SystemClock};
    ///
    /// let generator = SnowflakeIdGenerator::new(&StaticWorkerIdAssigner::new(1, 2), SystemClock)?;
    /// let a = generator.next_id()?;
    /// let b = generator.next_id()?;
    /// assert!(a < b);
    /// assert_eq!(a.datacenter_id(), 1);
    /// assert_eq!(a.worker_id(), 2);
    /// # Ok::<(), segflake::Error>(())
    /// ```
    pub fn new<A>(assigner: &A, time: T) -> Result<Self>
    where
        A: WorkerIdAssigner + ?Sized,
    {
        Self::with_epoch(assigner, time, DEFAULT_EPOCH)
    }

    /// Creates a generator whose timestamps count from `epoch` (a duration
    /// since 1970-01-01 UTC).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either id is outside
    /// `[0, 31]`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn with_epoch<A>(assigner: &A, time: T, epoch: Duration) -> Result<Self>
    where
        A: WorkerIdAssigner + ?Sized,
    {
        let datacenter_id = assigner.datacenter_id();
        let worker_id = assigner.worker_id();
        validate_worker_identity(datacenter_id, worker_id)?;

        let generator = Self {
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(Mutex::new(State::default())),
            #[cfg(not(feature = "cache-padded"))]
            state: Mutex::new(State::default()),
            // both validated to [0, 31]
            datacenter_id: datacenter_id as u64,
            worker_id: worker_id as u64,
            epoch: epoch.as_millis() as u64,
            time,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            datacenter_id,
            worker_id,
            epoch = generator.epoch,
            "snowflake generator initialised"
        );

        Ok(generator)
    }

    pub const fn datacenter_id(&self) -> u64 {
        self.datacenter_id
    }

    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// The epoch, in milliseconds since 1970-01-01 UTC.
    pub const fn epoch_millis(&self) -> u64 {
        self.epoch
    }

    /// Generates the next id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockMovedBackwards`] if the clock reads earlier than
    /// the previous id's timestamp, or earlier than the epoch. No state is
    /// changed in that case.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_id(&self) -> Result<SnowflakeId> {
        let mut state = self.state.lock();
        let mut now = self.time.current_millis();

        if now < self.epoch {
            return Err(Self::cold_clock_behind(self.epoch, now));
        }

        let sequence = match state.last_timestamp {
            Some(last) if now < last => return Err(Self::cold_clock_behind(last, now)),
            Some(last) if now == last => {
                if state.sequence < SnowflakeId::max_sequence() {
                    state.sequence + 1
                } else {
                    now = self.wait_next_millis(last);
                    0
                }
            }
            _ => 0,
        };

        state.sequence = sequence;
        state.last_timestamp = Some(now);

        let elapsed = now - self.epoch;
        debug_assert!(elapsed <= SnowflakeId::max_timestamp(), "timestamp overflow");
        Ok(SnowflakeId::from(
            elapsed,
            self.datacenter_id,
            self.worker_id,
            sequence,
        ))
    }

    /// Spins until the clock reads strictly past `last`.
    fn wait_next_millis(&self, last: u64) -> u64 {
        loop {
            let now = self.time.current_millis();
            if now > last {
                return now;
            }
            core::hint::spin_loop();
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(last_timestamp: u64, now: u64) -> Error {
        #[cfg(feature = "tracing")]
        tracing::error!(
            last_timestamp,
            now,
            behind_ms = last_timestamp - now,
            "clock moved backwards, refusing to generate id"
        );
        Error::ClockMovedBackwards {
            last_timestamp,
            now,
        }
    }
}

impl<T> IdGenerator for SnowflakeIdGenerator<T>
where
    T: TimeSource + Send + Sync,
{
    fn generate_long_id(&self) -> Result<i64> {
        self.next_id().map(|id| id.to_i64())
    }
}

impl<T> core::fmt::Debug for SnowflakeIdGenerator<T>
where
    T: TimeSource,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SnowflakeIdGenerator")
            .field("datacenter_id", &self.datacenter_id)
            .field("worker_id", &self.worker_id)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
