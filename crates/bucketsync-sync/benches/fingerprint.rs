//! Benchmarks for ETag-compatible fingerprinting

use bucketsync_sync::ContentFingerprint;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::hint::black_box;
use tempfile::TempDir;

fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_in_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint_in_memory");
    let fingerprint = ContentFingerprint::with_raw_chunk_size(1024 * 1024);

    for size in [4 * 1024, 512 * 1024, 4 * 1024 * 1024] {
        let data = generate_test_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(fingerprint.fingerprint(black_box(data))));
        });
    }

    group.finish();
}

fn bench_file(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let mut group = c.benchmark_group("fingerprint_file");
    group.sample_size(20);

    // Crosses the default 5 MiB chunk, so the multipart form is exercised
    for size in [1024 * 1024, 8 * 1024 * 1024] {
        let path = temp_dir.path().join(format!("{}.bin", size));
        fs::write(&path, generate_test_data(size)).unwrap();
        let fingerprint = ContentFingerprint::default();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(fingerprint.fingerprint_file(&path).await) });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_in_memory, bench_file);
criterion_main!(benches);
