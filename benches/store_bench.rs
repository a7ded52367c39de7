//! Benchmarks for the Minutely bucket store
//!
//! Run with: cargo bench

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use minutely::storage::*;
use std::sync::Arc;
use tempfile::tempdir;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// One week of minute buckets with a running total
async fn seed(store: &BucketStore) {
    let mut total = 0;
    for i in 0..(7 * 24 * 60) {
        let count = i % 5;
        total += count;
        let bucket = Bucket::new(base_time() + Duration::minutes(i), count, total).unwrap();
        store.create(bucket).await.unwrap();
    }
}

fn sqlite_store(dir: &std::path::Path) -> BucketStore {
    let backend = SqliteBackend::open(dir, std::time::Duration::from_secs(5)).unwrap();
    BucketStore::new(Arc::new(backend))
}

fn bench_sqlite(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempdir().unwrap();
    let store = sqlite_store(dir.path());
    rt.block_on(seed(&store));

    let mut group = c.benchmark_group("sqlite");

    group.bench_function("get_range_day", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = std::time::Instant::now();

                for _ in 0..iters {
                    let from = base_time() + Duration::days(3);
                    let _ = store
                        .get_range(black_box(from), from + Duration::days(1))
                        .await
                        .unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.bench_function("get_previous_bucket", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = std::time::Instant::now();

                for i in 0..iters {
                    let at = base_time() + Duration::minutes(1 + (i % 10_000) as i64);
                    let _ = store.get_previous_bucket(black_box(at)).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.bench_function("set_count", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = std::time::Instant::now();

                for i in 0..iters {
                    let at = base_time() + Duration::minutes((i % 10_000) as i64);
                    store.set_count(black_box(at), 1, i as i64).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.finish();
}

fn bench_memory(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = BucketStore::in_memory();
    rt.block_on(seed(&store));

    let mut group = c.benchmark_group("memory");

    group.bench_function("get_exact", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = std::time::Instant::now();

                for i in 0..iters {
                    let at = base_time() + Duration::minutes((i % 10_000) as i64);
                    let _ = store.get_exact(black_box(at)).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sqlite, bench_memory);
criterion_main!(benches);
