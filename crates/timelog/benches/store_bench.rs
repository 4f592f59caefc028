//! Benchmarks for timelog append and range query paths.
//!
//! Run with: cargo bench --package alopex-timelog
//!
//! ## Benchmark Categories
//!
//! - **Append**: Buffered record writes, dense and sampled index
//! - **Open**: Index replay on open
//! - **Query**: Narrow and wide range scans, with and without a filter

use alopex_timelog::{IndexPolicy, Store, StoreConfig};
use chrono::{DateTime, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

/// Records per benchmark store: 5 hours at one record per second.
const RECORD_COUNT: i64 = 5 * 3600;

/// Start of the generated data.
const START_TS: i64 = 1_700_000_000;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn payload(i: i64) -> String {
    format!(
        "{} {:016x}",
        (i * 7919) % 10_000,
        (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    )
}

/// Builds a populated store and returns its directory.
fn populated_store(policy: IndexPolicy) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::new(temp_dir.path()).with_index_policy(policy);
    let mut store = Store::open("bench", config).unwrap();
    for i in 0..RECORD_COUNT {
        store.append_data(&payload(i), Some(at(START_TS + i))).unwrap();
    }
    store.sync().unwrap();
    temp_dir
}

fn open_store(dir: &TempDir, policy: IndexPolicy) -> Store {
    let config = StoreConfig::new(dir.path()).with_index_policy(policy);
    Store::open("bench", config).unwrap()
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(10_000));

    for (name, policy) in [
        ("dense", IndexPolicy::Dense),
        ("sampled_1000", IndexPolicy::sampled()),
    ] {
        group.bench_with_input(BenchmarkId::new("10k", name), &policy, |b, &policy| {
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let store = open_store(&temp_dir, policy);
                    (temp_dir, store)
                },
                |(temp_dir, mut store)| {
                    for i in 0..10_000 {
                        store.append_data(&payload(i), Some(at(START_TS + i))).unwrap();
                    }
                    store.flush().unwrap();
                    (temp_dir, store)
                },
                criterion::BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let dense = populated_store(IndexPolicy::Dense);
    let sampled = populated_store(IndexPolicy::sampled());

    c.bench_function("open_dense_18k", |b| {
        b.iter(|| black_box(open_store(&dense, IndexPolicy::Dense)))
    });
    c.bench_function("open_sampled_18k", |b| {
        b.iter(|| black_box(open_store(&sampled, IndexPolicy::sampled())))
    });
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for (name, policy) in [
        ("dense", IndexPolicy::Dense),
        ("sampled_1000", IndexPolicy::sampled()),
    ] {
        let dir = populated_store(policy);
        let mut store = open_store(&dir, policy);

        // One minute, two hours, and the full span.
        for (label, span) in [("1m", 60), ("2h", 2 * 3600), ("all", RECORD_COUNT)] {
            let begin = START_TS + (RECORD_COUNT - span) / 2;
            let end = begin + span - 1;
            group.bench_function(BenchmarkId::new(name, label), |b| {
                b.iter(|| {
                    let scan = store.get_data(at(begin), at(end), None).unwrap();
                    black_box(scan.count())
                })
            });
        }

        let begin = START_TS + 3600;
        let end = begin + 2 * 3600;
        group.bench_function(BenchmarkId::new(name, "2h_filtered"), |b| {
            b.iter(|| {
                let scan = store
                    .get_data(
                        at(begin),
                        at(end),
                        Some(Box::new(|p: &str| p.contains("1024"))),
                    )
                    .unwrap();
                black_box(scan.count())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append, bench_open, bench_query);
criterion_main!(benches);
