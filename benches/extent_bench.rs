//! Benchmarks for the range algebra and series documents
//!
//! Run with: cargo bench

use chrono::Duration;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use deltacache::deltaproxy::{DataPoint, SeriesDocument};
use deltacache::timeseries::{Epoch, Extent, ExtentList, ExtentListLru};

const BASE: i64 = 1_577_836_800;

/// `count` one-hour extents separated by one-hour gaps
fn create_gappy_list(count: usize) -> ExtentList {
    (0..count as i64)
        .map(|i| Extent::from_secs(BASE + i * 7_200, BASE + i * 7_200 + 3_600))
        .collect()
}

fn bench_deltas(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate_deltas");
    let step = Duration::seconds(60);

    for size in [10, 100, 1000] {
        let list = create_gappy_list(size);
        let need = Extent::from_secs(BASE, BASE + size as i64 * 7_200);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("gappy_{}", size), |b| {
            b.iter(|| black_box(&list).calculate_deltas(black_box(&need), step))
        });
    }

    group.finish();
}

fn bench_list_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("extent_list");
    let step = Duration::seconds(60);
    let list = create_gappy_list(1000);
    let removals: ExtentList = create_gappy_list(1000)
        .iter()
        .step_by(3)
        .map(|e| Extent::new(e.start + Duration::seconds(600), e.end - Duration::seconds(600)))
        .collect();

    group.bench_function("compress_1000", |b| {
        b.iter(|| black_box(&list).compress(step))
    });

    group.bench_function("remove_333_from_1000", |b| {
        b.iter(|| black_box(&list).remove(black_box(&removals), step))
    });

    group.bench_function("splice_by_points_1000", |b| {
        b.iter(|| black_box(&list).splice(step, Duration::zero(), Duration::zero(), 11))
    });

    group.bench_function("update_last_used_1000", |b| {
        let lru = ExtentListLru::from(list.clone());
        let read = Extent::from_secs(BASE + 1_800, BASE + 500 * 7_200);
        b.iter(|| black_box(&lru).update_last_used_at(&read, step, Epoch::from_secs(BASE)))
    });

    group.finish();
}

fn bench_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("series_document");

    for size in [1_000, 10_000] {
        let mut doc = SeriesDocument::new();
        doc.add_extents([Extent::from_secs(BASE, BASE + (size as i64 - 1) * 60)]);
        doc.merge((0..size as i64).map(|i| DataPoint::new(Epoch::from_secs(BASE + i * 60), i as f64)));

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("encode_{}", size), |b| {
            b.iter(|| black_box(&doc).encode().unwrap())
        });

        let encoded = doc.encode().unwrap();
        group.bench_function(format!("decode_{}", size), |b| {
            b.iter(|| SeriesDocument::decode(black_box(&encoded)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_deltas, bench_list_ops, bench_document);
criterion_main!(benches);
