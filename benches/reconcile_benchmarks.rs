//! Benchmarks for hashing and full reconciliation.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use tempfile::TempDir;

use rescache::hasher::Hasher;
use rescache::index::CacheIndex;
use rescache::reconciler::Reconciler;
use rescache::scheduler::{CancelToken, ScanState};

fn bench_hash_file(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("payload.mdl");
    let content = vec![0xabu8; 4 * 1024 * 1024];
    File::create(&path).unwrap().write_all(&content).unwrap();

    let hasher = Hasher::new();
    let mut group = c.benchmark_group("hash_file");
    group.throughput(Throughput::Bytes(content.len() as u64));
    group.bench_function("4MiB", |b| {
        b.iter(|| hasher.hash_file(&path).unwrap());
    });
    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let source = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    for i in 0..100 {
        let path = source.path().join(format!("res{i:03}.mdl"));
        File::create(&path)
            .unwrap()
            .write_all(format!("resource payload {i}").as_bytes())
            .unwrap();
    }

    c.bench_function("reconcile_100_files_warm", |b| {
        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let state = Arc::new(ScanState::new());
        let reconciler = Reconciler::new(Arc::clone(&index), state)
            .with_chunk_yield(Duration::ZERO);
        let token = CancelToken::new();
        // Warm run so the benchmark measures validation, not first-time hashing.
        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();

        b.iter(|| {
            reconciler
                .reconcile(Some(source.path()), cache.path(), &token)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_hash_file, bench_reconcile);
criterion_main!(benches);
