//! In-process stores for embedding and tests.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};

use crate::{CounterStore, ProviderError, SegmentRow, SegmentTable, SegmentTransaction};

/// A [`SegmentTable`] held in memory.
///
/// A transaction holds the table lock for its whole lifetime, which stands in
/// for the row lock of `SELECT ... FOR UPDATE`. Writes are staged and only
/// applied on commit.
#[derive(Debug, Default)]
pub struct MemorySegmentTable {
    rows: Mutex<HashMap<String, SegmentRow>>,
}

impl MemorySegmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemorySegmentTable::insert`].
    #[must_use]
    pub fn with_row(self, biz_key: impl Into<String>, max_id: i64, step: i64) -> Self {
        self.insert(biz_key, SegmentRow { max_id, step });
        self
    }

    /// Inserts or replaces the row for `biz_key`.
    pub fn insert(&self, biz_key: impl Into<String>, row: SegmentRow) {
        self.rows.lock().insert(biz_key.into(), row);
    }

    /// The committed row for `biz_key`.
    pub fn row(&self, biz_key: &str) -> Option<SegmentRow> {
        self.rows.lock().get(biz_key).copied()
    }
}

impl SegmentTable for MemorySegmentTable {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, ProviderError> {
        Ok(MemoryTransaction {
            rows: self.rows.lock(),
            staged: HashMap::new(),
        })
    }
}

/// A transaction on a [`MemorySegmentTable`].
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    rows: MutexGuard<'a, HashMap<String, SegmentRow>>,
    staged: HashMap<String, i64>,
}

impl MemoryTransaction<'_> {
    fn visible(&self, biz_key: &str) -> Option<SegmentRow> {
        let row = self.rows.get(biz_key).copied()?;
        Some(SegmentRow {
            max_id: self.staged.get(biz_key).copied().unwrap_or(row.max_id),
            ..row
        })
    }
}

impl SegmentTransaction for MemoryTransaction<'_> {
    fn select_for_update(&mut self, biz_key: &str) -> Result<Option<SegmentRow>, ProviderError> {
        Ok(self.visible(biz_key))
    }

    fn compare_and_set_max_id(
        &mut self,
        biz_key: &str,
        expected: i64,
        new_max: i64,
    ) -> Result<u64, ProviderError> {
        match self.visible(biz_key) {
            Some(row) if row.max_id == expected => {
                self.staged.insert(biz_key.to_owned(), new_max);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn commit(mut self) -> Result<(), ProviderError> {
        for (biz_key, max_id) in self.staged.drain() {
            if let Some(row) = self.rows.get_mut(&biz_key) {
                row.max_id = max_id;
            }
        }
        Ok(())
    }

    fn rollback(self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// A [`CounterStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`, `None` if it was never written.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.counters.lock().get(key).copied()
    }
}

impl CounterStore for MemoryCounterStore {
    fn incr_by(&self, key: &str, delta: i64) -> Result<i64, ProviderError> {
        let mut counters = self.counters.lock();
        let counter = counters.entry(key.to_owned()).or_insert(0);
        *counter = counter
            .checked_add(delta)
            .ok_or_else(|| ProviderError::InvalidRange {
                reason: format!("counter `{key}` overflows"),
            })?;
        Ok(*counter)
    }

    fn set_if_absent(&self, key: &str, value: i64) -> Result<bool, ProviderError> {
        let mut counters = self.counters.lock();
        if counters.contains_key(key) {
            return Ok(false);
        }
        counters.insert(key.to_owned(), value);
        Ok(true)
    }
}
