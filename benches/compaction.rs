use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

use fbp::compact::{MissingRanges, RequestBatches};
use fbp::PresenceBitmap;

/// `loss` 비율만큼 비어 있는 비트맵
fn lossy_bitmap(num_packets: usize, loss: f64) -> PresenceBitmap {
    let mut rng = StdRng::seed_from_u64(42);
    let mut bm = PresenceBitmap::new(num_packets);
    for i in 0..num_packets {
        if !rng.gen_bool(loss) {
            bm.set(i);
        }
    }
    bm
}

fn bench_missing_ranges(c: &mut Criterion) {
    let mut group = c.benchmark_group("missing_ranges");

    for &loss in &[0.001, 0.01, 0.1, 0.5] {
        let num_packets = 256 * 1024; // 1 GiB 파일
        let bm = lossy_bitmap(num_packets, loss);
        group.throughput(Throughput::Elements(num_packets as u64));
        group.bench_with_input(BenchmarkId::from_parameter(loss), &bm, |b, bm| {
            b.iter(|| MissingRanges::new(black_box(bm), num_packets as u32).count())
        });
    }

    group.finish();
}

fn bench_request_batches(c: &mut Criterion) {
    let num_packets = 256 * 1024;
    let bm = lossy_bitmap(num_packets, 0.05);

    let mut group = c.benchmark_group("request_batches");
    group.throughput(Throughput::Elements(num_packets as u64));
    group.bench_function("encode_5pct_loss", |b| {
        b.iter(|| {
            RequestBatches::new(1, black_box(&bm), num_packets as u32)
                .map(|p| p.to_bytes().len())
                .sum::<usize>()
        })
    });
    group.finish();
}

fn bench_full_bitmap(c: &mut Criterion) {
    let num_packets = 256 * 1024;
    let bm = lossy_bitmap(num_packets, 0.0);
    c.bench_function("missing_ranges_complete", |b| {
        b.iter(|| MissingRanges::new(black_box(&bm), num_packets as u32).count())
    });
}

criterion_group!(
    benches,
    bench_missing_ranges,
    bench_request_batches,
    bench_full_bitmap
);
criterion_main!(benches);
