//! Run with the validation counter enabled (default):
//!   cargo bench --bench rc_benchmark
//!
//! Run without the counter for clean numbers:
//!   cargo bench --bench rc_benchmark --no-default-features

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rc::{DynamicRc, ManualRef, SoloRc, SyncRc};
use wechsel::{build_tree, run_dynamic, run_sync, StressConfig, TreeRef};

/// Field count of every benchmark node.
const FIELD_LENGTH: usize = 2;

/// Depth of the single-thread build/teardown trees (2^12 - 1 nodes).
const SINGLE_THREAD_DEPTH: usize = 12;

fn stress_config() -> StressConfig {
    StressConfig {
        workers: 8,
        rounds: 10,
        field_length: FIELD_LENGTH,
        depth: 10,
    }
}

fn build_and_teardown<R: TreeRef>() {
    let root: R = build_tree(black_box(FIELD_LENGTH), SINGLE_THREAD_DEPTH);
    root.release();
}

fn benchmark_single_thread_manual(c: &mut Criterion) {
    c.bench_function("single_thread/manual", |b| {
        b.iter(build_and_teardown::<ManualRef>)
    });
}

fn benchmark_single_thread_solo(c: &mut Criterion) {
    c.bench_function("single_thread/solo", |b| {
        b.iter(build_and_teardown::<SoloRc>)
    });
}

fn benchmark_single_thread_sync(c: &mut Criterion) {
    c.bench_function("single_thread/sync", |b| {
        b.iter(build_and_teardown::<SyncRc>)
    });
}

fn benchmark_single_thread_dynamic(c: &mut Criterion) {
    c.bench_function("single_thread/dynamic", |b| {
        b.iter(build_and_teardown::<DynamicRc>)
    });
}

fn benchmark_multi_thread_sync(c: &mut Criterion) {
    let config = stress_config();
    c.bench_function("multi_thread/sync", |b| {
        b.iter(|| run_sync(black_box(&config)))
    });
}

fn benchmark_multi_thread_dynamic(c: &mut Criterion) {
    let config = stress_config();
    c.bench_function("multi_thread/dynamic", |b| {
        b.iter(|| run_dynamic(black_box(&config)))
    });
}

criterion_group!(
    benches,
    benchmark_single_thread_manual,
    benchmark_single_thread_solo,
    benchmark_single_thread_sync,
    benchmark_single_thread_dynamic,
    benchmark_multi_thread_sync,
    benchmark_multi_thread_dynamic,
);
criterion_main!(benches);
