//! Bulk migration benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lookup_core::NoProgress;
use lookup_migration::DiffLog;
use lookup_model::{Row, Table};
use lookup_testkit::{scenarios, TestStores, TEST_DOMAIN};

/// Benchmark migrating a legacy dump into an empty relational store.
fn bench_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("migrate_rows");
    group.sample_size(10);

    for rows in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, &rows| {
            let docs = scenarios::legacy_dump(TEST_DOMAIN, 1, rows);

            b.iter_with_setup(
                || {
                    let stores = TestStores::memory();
                    stores.load_legacy(docs.clone());
                    let mut log = DiffLog::in_memory();
                    stores
                        .adapter()
                        .bulk_migrate::<Table>(&mut log, &NoProgress)
                        .unwrap();
                    stores
                },
                |stores| {
                    let mut log = DiffLog::in_memory();
                    stores
                        .adapter()
                        .bulk_migrate::<Row>(&mut log, &NoProgress)
                        .unwrap()
                },
            );
        });
    }
    group.finish();
}

/// Benchmark a second pass over an already migrated dump, which only
/// compares documents.
fn bench_rescan(c: &mut Criterion) {
    let mut group = c.benchmark_group("migrate_rescan");
    group.sample_size(10);

    for tables in [1, 10].iter() {
        let stores = TestStores::memory();
        stores.load_legacy(scenarios::legacy_dump(TEST_DOMAIN, *tables, 100));
        stores.migrate_all();

        group.throughput(Throughput::Elements(*tables as u64 * 100));
        group.bench_with_input(BenchmarkId::from_parameter(tables), tables, |b, _| {
            b.iter(|| {
                let mut log = DiffLog::in_memory();
                stores
                    .adapter()
                    .bulk_migrate::<Row>(&mut log, &NoProgress)
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rows, bench_rescan);
criterion_main!(benches);
