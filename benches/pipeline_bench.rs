//! Benchmarks for parhash.
//!
//! Run with:
//!     cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parhash::{Algorithm, HashConfig, HashError, MemoryMonitor, MemorySink, Pipeline, ThreadCount};
use std::io::Write;
use std::sync::Arc;

struct Unlimited;

impl MemoryMonitor for Unlimited {
    fn available_bytes(&self) -> Result<u64, HashError> {
        Ok(u64::MAX)
    }

    fn total_bytes(&self) -> u64 {
        u64::MAX
    }

    fn reclaim(&self) {}
}

fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");
    let data: Vec<u8> = (0..1024 * 1024).map(|i| (i * 7 + 13) as u8).collect();
    group.throughput(Throughput::Bytes(data.len() as u64));
    for alg in [Algorithm::Sha256, Algorithm::Blake3] {
        group.bench_function(alg.name(), |b| b.iter(|| alg.digest_hex(black_box(&data))));
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    let size = 16 * 1024 * 1024;
    let data: Vec<u8> = (0..size).map(|i| (i * 31 + 7) as u8).collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&data).unwrap();
    file.flush().unwrap();
    group.throughput(Throughput::Bytes(size as u64));

    for workers in [1, 2, 4, 8] {
        group.bench_function(format!("sha256_1mb_chunks_{}_workers", workers), |b| {
            b.iter(|| {
                let config = HashConfig::new(
                    1024 * 1024,
                    ThreadCount::Fixed(workers),
                    file.path(),
                    u64::MAX,
                )
                .unwrap();
                let sink = Arc::new(MemorySink::new());
                let summary = Pipeline::new(config, sink, Arc::new(Unlimited))
                    .start()
                    .unwrap()
                    .wait()
                    .unwrap();
                black_box(summary.chunks)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_digest, bench_pipeline);
criterion_main!(benches);
