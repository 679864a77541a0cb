use crate::{
    COUNTER_KEY_PREFIX, CounterSegmentProvider, CounterStore, DbSegmentProvider, Error,
    MemoryCounterStore, MemorySegmentTable, MemoryTransaction, ProviderError, SegmentProvider,
    SegmentRow, SegmentTable, SegmentTransaction,
};
use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::scope;

/// Reports a conflict on the first `conflicts` conditional updates.
struct ConflictingTable {
    inner: MemorySegmentTable,
    conflicts: AtomicUsize,
    begins: AtomicUsize,
}

impl ConflictingTable {
    fn new(inner: MemorySegmentTable, conflicts: usize) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(conflicts),
            begins: AtomicUsize::new(0),
        }
    }
}

struct ConflictingTransaction<'a> {
    inner: MemoryTransaction<'a>,
    conflicts: &'a AtomicUsize,
}

impl SegmentTable for ConflictingTable {
    type Transaction<'a> = ConflictingTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, ProviderError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(ConflictingTransaction {
            inner: self.inner.begin()?,
            conflicts: &self.conflicts,
        })
    }
}

impl SegmentTransaction for ConflictingTransaction<'_> {
    fn select_for_update(&mut self, biz_key: &str) -> Result<Option<SegmentRow>, ProviderError> {
        self.inner.select_for_update(biz_key)
    }

    fn compare_and_set_max_id(
        &mut self,
        biz_key: &str,
        expected: i64,
        new_max: i64,
    ) -> Result<u64, ProviderError> {
        let conflicted = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Ok(0);
        }
        self.inner.compare_and_set_max_id(biz_key, expected, new_max)
    }

    fn commit(self) -> Result<(), ProviderError> {
        self.inner.commit()
    }

    fn rollback(self) -> Result<(), ProviderError> {
        self.inner.rollback()
    }
}

fn bounds<P: SegmentProvider + ?Sized>(provider: &P, biz_key: &str) -> (i64, i64) {
    let segment = provider.next_segment(biz_key).unwrap();
    (segment.min(), segment.max())
}

#[test]
fn db_segments_are_contiguous() {
    let provider = DbSegmentProvider::new(MemorySegmentTable::new().with_row("order", 0, 100));

    assert_eq!(bounds(&provider, "order"), (1, 101));
    assert_eq!(bounds(&provider, "order"), (101, 201));
    assert_eq!(bounds(&provider, "order"), (201, 301));
    assert_eq!(
        provider.table().row("order"),
        Some(SegmentRow {
            max_id: 300,
            step: 100
        })
    );
}

#[test]
fn db_respects_row_step_and_offset() {
    let table = MemorySegmentTable::new()
        .with_row("order", 5_000, 10)
        .with_row("user", 0, 1);
    let provider = DbSegmentProvider::new(table);

    assert_eq!(bounds(&provider, "order"), (5_001, 5_011));
    assert_eq!(bounds(&provider, "user"), (1, 2));
    assert_eq!(bounds(&provider, "user"), (2, 3));
}

#[test]
fn db_missing_key() {
    let provider = DbSegmentProvider::new(MemorySegmentTable::new());
    assert!(matches!(
        provider.next_segment("order"),
        Err(ProviderError::MissingKey { ref biz_key }) if biz_key == "order"
    ));
}

#[test]
fn db_invalid_step_leaves_row_untouched() {
    let provider = DbSegmentProvider::new(MemorySegmentTable::new().with_row("order", 7, 0));
    assert!(matches!(
        provider.next_segment("order"),
        Err(ProviderError::InvalidRange { .. })
    ));
    assert_eq!(provider.table().row("order").unwrap().max_id, 7);
}

#[test]
fn db_retries_conflicts() {
    let table = ConflictingTable::new(MemorySegmentTable::new().with_row("order", 0, 10), 2);
    let provider = DbSegmentProvider::new(table).with_conflict_retries(3, Duration::from_millis(1));

    assert_eq!(bounds(&provider, "order"), (1, 11));
    assert_eq!(provider.table().begins.load(Ordering::SeqCst), 3);
    assert_eq!(provider.table().inner.row("order").unwrap().max_id, 10);
}

#[test]
fn db_gives_up_after_max_attempts() {
    let table = ConflictingTable::new(MemorySegmentTable::new().with_row("order", 0, 10), 5);
    let provider = DbSegmentProvider::new(table).with_conflict_retries(2, Duration::ZERO);

    let err = provider.next_segment("order").unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(err, ProviderError::Conflict { expected: 0, .. }));
    assert_eq!(provider.table().begins.load(Ordering::SeqCst), 2);
    assert_eq!(provider.table().inner.row("order").unwrap().max_id, 0);
}

#[test]
fn db_zero_attempts_still_tries_once() {
    let table = ConflictingTable::new(MemorySegmentTable::new().with_row("order", 0, 10), 0);
    let provider = DbSegmentProvider::new(table).with_conflict_retries(0, Duration::ZERO);
    assert_eq!(bounds(&provider, "order"), (1, 11));
}

#[test]
fn memory_transaction_stages_until_commit() {
    let table = MemorySegmentTable::new().with_row("order", 0, 10);

    let mut tx = table.begin().unwrap();
    assert_eq!(tx.compare_and_set_max_id("order", 0, 10).unwrap(), 1);
    assert_eq!(tx.select_for_update("order").unwrap().unwrap().max_id, 10);
    assert_eq!(tx.compare_and_set_max_id("order", 0, 20).unwrap(), 0);
    tx.rollback().unwrap();
    assert_eq!(table.row("order").unwrap().max_id, 0);

    let mut tx = table.begin().unwrap();
    assert_eq!(tx.compare_and_set_max_id("order", 0, 10).unwrap(), 1);
    assert_eq!(tx.compare_and_set_max_id("user", 0, 10).unwrap(), 0);
    tx.commit().unwrap();
    assert_eq!(table.row("order").unwrap().max_id, 10);
}

#[test]
fn counter_segments_are_contiguous() {
    let provider = CounterSegmentProvider::new(MemoryCounterStore::new(), 100).unwrap();

    assert_eq!(bounds(&provider, "order"), (1, 101));
    assert_eq!(bounds(&provider, "order"), (101, 201));
    assert_eq!(bounds(&provider, "user"), (1, 101));
    assert_eq!(
        provider.store().get(&format!("{COUNTER_KEY_PREFIX}order")),
        Some(200)
    );
}

#[test]
fn counter_init_segment_only_seeds_once() {
    let provider = CounterSegmentProvider::new(MemoryCounterStore::new(), 10).unwrap();

    assert!(provider.init_segment("order", 1_000).unwrap());
    assert!(!provider.init_segment("order", 5).unwrap());
    assert_eq!(bounds(&provider, "order"), (1_001, 1_011));
    assert_eq!(
        CounterSegmentProvider::<MemoryCounterStore>::counter_key("order"),
        "distributed_id:segment:order"
    );
}

#[test]
fn counter_rejects_non_positive_step() {
    for step in [0, -1] {
        assert!(matches!(
            CounterSegmentProvider::new(MemoryCounterStore::new(), step),
            Err(Error::InvalidConfiguration { .. })
        ));
    }
}

#[test]
fn counter_overflow_is_an_invalid_range() {
    let store = MemoryCounterStore::new();
    store.set_if_absent("distributed_id:segment:order", i64::MAX - 5).unwrap();
    let provider = CounterSegmentProvider::new(store, 10).unwrap();
    assert!(matches!(
        provider.next_segment("order"),
        Err(ProviderError::InvalidRange { .. })
    ));
}

#[test]
fn store_errors_keep_their_source() {
    let err = ProviderError::store("connection refused");
    assert!(!err.is_conflict());
    assert_eq!(err.to_string(), "segment store error: connection refused");
    assert!(std::error::Error::source(&err).is_some());
}

fn assert_disjoint_and_contiguous(mut segments: Vec<(i64, i64)>, first: i64, last: i64) {
    segments.sort_unstable();
    assert_eq!(segments.first().unwrap().0, first);
    assert_eq!(segments.last().unwrap().1, last);
    for pair in segments.windows(2) {
        assert_eq!(pair[0].1, pair[1].0, "gap or overlap between {pair:?}");
    }
}

#[test]
fn concurrent_leases_never_overlap() {
    const THREADS: usize = 8;
    const LEASES: usize = 50;

    let db = DbSegmentProvider::new(MemorySegmentTable::new().with_row("order", 0, 10));
    let counter = CounterSegmentProvider::new(MemoryCounterStore::new(), 10).unwrap();
    let providers: [&dyn SegmentProvider; 2] = [&db, &counter];

    for provider in providers {
        let segments: Vec<(i64, i64)> = scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        (0..LEASES)
                            .map(|_| bounds(provider, "order"))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        assert_eq!(segments.len(), THREADS * LEASES);
        assert_disjoint_and_contiguous(segments, 1, 4_001);
    }
}
