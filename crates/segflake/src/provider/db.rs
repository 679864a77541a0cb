//! Segment leasing on top of a transactional table.
//!
//! Each business key owns one row of [`SEGMENT_TABLE`] holding the highest
//! id leased so far (`max_id`) and the lease size (`step`). Leasing a segment
//! locks the row, advances `max_id` by `step` with an optimistic check on the
//! old value, and commits. The range between the old and the new `max_id`
//! belongs to the caller.

use core::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{IdSegment, ProviderError, SegmentProvider};

/// Name of the backing table: `(biz_key VARCHAR PRIMARY KEY, max_id BIGINT,
/// step INT)`.
pub const SEGMENT_TABLE: &str = "t_segment_id_biz";

/// Attempts made on optimistic lock conflicts before giving up.
pub const DEFAULT_CONFLICT_ATTEMPTS: u32 = 3;

/// Backoff after the first conflict; grows linearly with each attempt.
pub const DEFAULT_CONFLICT_BACKOFF: Duration = Duration::from_millis(10);

/// One business key's counter row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentRow {
    pub max_id: i64,
    pub step: i64,
}

/// A store that can open isolated transactions over [`SEGMENT_TABLE`].
pub trait SegmentTable: Send + Sync {
    type Transaction<'a>: SegmentTransaction
    where
        Self: 'a;

    /// Opens a new transaction.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] if the store is unreachable.
    fn begin(&self) -> Result<Self::Transaction<'_>, ProviderError>;
}

/// An open transaction. Dropping it without committing discards its writes.
pub trait SegmentTransaction {
    /// Reads the row for `biz_key`, locking it until the transaction ends.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] on store failure.
    fn select_for_update(&mut self, biz_key: &str) -> Result<Option<SegmentRow>, ProviderError>;

    /// `UPDATE ... SET max_id = new_max WHERE biz_key = ? AND max_id =
    /// expected`, returning the number of rows affected.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] on store failure.
    fn compare_and_set_max_id(
        &mut self,
        biz_key: &str,
        expected: i64,
        new_max: i64,
    ) -> Result<u64, ProviderError>;

    /// # Errors
    ///
    /// [`ProviderError::Store`] on store failure.
    fn commit(self) -> Result<(), ProviderError>;

    /// # Errors
    ///
    /// [`ProviderError::Store`] on store failure.
    fn rollback(self) -> Result<(), ProviderError>;
}

/// A [`SegmentProvider`] backed by a [`SegmentTable`].
///
/// A row holding `max_id = m, step = s` yields the segment `[m + 1, m + s +
/// 1)` and is advanced to `m + s`, so consecutive segments are contiguous.
/// Optimistic lock conflicts are retried a bounded number of times with a
/// linear backoff. Every other failure rolls the transaction back and is
/// returned as is.
///
/// # Example
/// ```
/// use segflake::{DbSegmentProvider, MemorySegmentTable, SegmentProvider};
///
/// let table = MemorySegmentTable::new().with_row("order", 0, 100);
/// let provider = DbSegmentProvider::new(table);
///
/// let first = provider.next_segment("order")?;
/// let second = provider.next_segment("order")?;
/// assert_eq!((first.min(), first.max()), (1, 101));
/// assert_eq!((second.min(), second.max()), (101, 201));
/// # Ok::<(), segflake::ProviderError>(())
/// ```
#[derive(Debug)]
pub struct DbSegmentProvider<S> {
    table: S,
    max_attempts: u32,
    backoff: Duration,
}

impl<S> DbSegmentProvider<S>
where
    S: SegmentTable,
{
    /// Uses [`DEFAULT_CONFLICT_ATTEMPTS`] and [`DEFAULT_CONFLICT_BACKOFF`].
    pub const fn new(table: S) -> Self {
        Self {
            table,
            max_attempts: DEFAULT_CONFLICT_ATTEMPTS,
            backoff: DEFAULT_CONFLICT_BACKOFF,
        }
    }

    /// Makes at most `max_attempts` (at least one) attempts per lease,
    /// sleeping `backoff * n` after the `n`th conflict.
    #[must_use]
    pub const fn with_conflict_retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        self.backoff = backoff;
        self
    }

    pub const fn table(&self) -> &S {
        &self.table
    }

    /// One transactional attempt.
    fn allocate(&self, biz_key: &str) -> Result<IdSegment, ProviderError> {
        let mut tx = self.table.begin()?;
        match Self::advance(&mut tx, biz_key) {
            Ok(segment) => {
                tx.commit()?;
                Ok(segment)
            }
            Err(e) => {
                if let Err(_rollback) = tx.rollback() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(biz_key, error = %_rollback, "segment rollback failed");
                }
                Err(e)
            }
        }
    }

    fn advance(tx: &mut S::Transaction<'_>, biz_key: &str) -> Result<IdSegment, ProviderError> {
        let row = tx
            .select_for_update(biz_key)?
            .ok_or_else(|| ProviderError::MissingKey {
                biz_key: biz_key.to_owned(),
            })?;

        let overflow = || ProviderError::InvalidRange {
            reason: format!(
                "advancing `{biz_key}` from {} by {} overflows",
                row.max_id, row.step
            ),
        };
        let new_max = row.max_id.checked_add(row.step).ok_or_else(overflow)?;
        let segment = IdSegment::new(
            row.max_id.checked_add(1).ok_or_else(overflow)?,
            new_max.checked_add(1).ok_or_else(overflow)?,
        )?;

        if tx.compare_and_set_max_id(biz_key, row.max_id, new_max)? == 0 {
            return Err(ProviderError::Conflict {
                biz_key: biz_key.to_owned(),
                expected: row.max_id,
            });
        }
        Ok(segment)
    }
}

impl<S> SegmentProvider for DbSegmentProvider<S>
where
    S: SegmentTable,
{
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    fn next_segment(&self, biz_key: &str) -> Result<IdSegment, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.allocate(biz_key) {
                Ok(segment) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        biz_key,
                        min = segment.min(),
                        max = segment.max(),
                        "leased segment from table"
                    );
                    return Ok(segment);
                }
                Err(e) if e.is_conflict() && attempt < self.max_attempts => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(biz_key, attempt, "segment lease conflicted, retrying");
                    std::thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
