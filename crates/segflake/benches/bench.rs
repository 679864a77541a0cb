use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use segflake::{
    CounterSegmentProvider, IdGenerator, MemoryCounterStore, SegmentConfig, SegmentIdGenerator,
    SnowflakeIdGenerator, StaticWorkerIdAssigner, SystemClock, TimeSource,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::{Duration, Instant},
};

/// A clock that advances one millisecond every 4096 reads, so the Snowflake
/// sequence never overflows and never spins.
struct SteppingMockTime {
    reads: portable_atomic::AtomicU64,
}

impl TimeSource for SteppingMockTime {
    fn current_millis(&self) -> u64 {
        let reads = self
            .reads
            .fetch_add(1, portable_atomic::Ordering::Relaxed);
        1 + reads / 4096
    }
}

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 4096;

fn segment_config(step: i64) -> SegmentConfig {
    SegmentConfig {
        step,
        ..SegmentConfig::default()
    }
}

fn segment_generator(step: i64) -> SegmentIdGenerator<CounterSegmentProvider<MemoryCounterStore>> {
    let provider = CounterSegmentProvider::new(MemoryCounterStore::new(), step).unwrap();
    SegmentIdGenerator::new(Arc::new(provider), &segment_config(step), SystemClock).unwrap()
}

/// Single-threaded throughput of a generator built fresh per iteration.
fn bench_sequential<G: IdGenerator>(c: &mut Criterion, group_name: &str, factory: impl Fn() -> G) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let mut elapsed = Duration::ZERO;
            for _ in 0..iters {
                let generator = factory();
                let start = Instant::now();
                for _ in 0..TOTAL_IDS {
                    black_box(generator.generate_long_id().unwrap());
                }
                elapsed += start.elapsed();
            }
            elapsed
        });
    });

    group.finish();
}

/// Many threads hammering one shared generator.
fn bench_contended<G: IdGenerator>(c: &mut Criterion, group_name: &str, factory: impl Fn() -> G) {
    let mut group = c.benchmark_group(group_name);
    group.sample_size(10);

    let max_threads = num_cpus::get().max(1);
    for threads in [1, 2, 4, 8, 16].into_iter().filter(|t| *t <= max_threads) {
        let total_ids = TOTAL_IDS * threads;
        group.throughput(Throughput::Elements(total_ids as u64));
        group.bench_function(format!("elems/{total_ids}/threads/{threads}"), |b| {
            b.iter_custom(|iters| {
                let mut elapsed = Duration::ZERO;
                for _ in 0..iters {
                    let generator = factory();
                    let barrier = Barrier::new(threads + 1);
                    let start = scope(|s| {
                        for _ in 0..threads {
                            s.spawn(|| {
                                barrier.wait();
                                for _ in 0..TOTAL_IDS {
                                    black_box(generator.generate_long_id().unwrap());
                                }
                            });
                        }
                        barrier.wait();
                        Instant::now()
                    });
                    elapsed += start.elapsed();
                }
                elapsed
            });
        });
    }

    group.finish();
}

fn benchmark_snowflake_mock(c: &mut Criterion) {
    bench_sequential(c, "snowflake/mock", || {
        SnowflakeIdGenerator::new(
            &StaticWorkerIdAssigner::new(1, 1),
            SteppingMockTime {
                reads: portable_atomic::AtomicU64::new(0),
            },
        )
        .unwrap()
    });
}

fn benchmark_snowflake_system(c: &mut Criterion) {
    bench_sequential(c, "snowflake/system", || {
        SnowflakeIdGenerator::new(&StaticWorkerIdAssigner::new(1, 1), SystemClock).unwrap()
    });
}

fn benchmark_snowflake_contended(c: &mut Criterion) {
    bench_contended(c, "snowflake/contended", || {
        SnowflakeIdGenerator::new(&StaticWorkerIdAssigner::new(1, 1), SystemClock).unwrap()
    });
}

fn benchmark_segment_sequential(c: &mut Criterion) {
    bench_sequential(c, "segment/sequential", || segment_generator(1000));
}

fn benchmark_segment_small_step(c: &mut Criterion) {
    // exercises switching and background refills
    bench_sequential(c, "segment/step-64", || segment_generator(64));
}

fn benchmark_segment_contended(c: &mut Criterion) {
    bench_contended(c, "segment/contended", || segment_generator(1000));
}

criterion_group!(
    benches,
    benchmark_snowflake_mock,
    benchmark_snowflake_system,
    benchmark_snowflake_contended,
    benchmark_segment_sequential,
    benchmark_segment_small_step,
    benchmark_segment_contended,
);
criterion_main!(benches);
