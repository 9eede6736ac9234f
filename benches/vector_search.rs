//! Vector search benchmarks
//!
//! Run with: cargo bench --bench vector_search
//!
//! - vector_insert: single upserts into a growing index
//! - vector_search: exact k-NN across index sizes and k
//! - vector_metric_comparison: L2 vs cosine at fixed size
//! - vector_snapshot: full flush of the index to disk

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use tempfile::TempDir;
use vecdex::{DistanceMetric, IndexConfig, IndexEngine, VectorId};

// ============================================================================
// Constants and Utilities
// ============================================================================

/// Fixed seed for reproducible benchmarks
const BENCH_SEED: u64 = 0xDEADBEEF_CAFEBABE;

const DIMENSION: usize = 128;

/// Simple LCG for deterministic pseudo-random number generation
fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

/// Generate a deterministic random vector of given dimension
fn random_vector(dimension: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..dimension)
        .map(|_| {
            let bits = lcg_next(&mut state);
            // Map to [-1, 1] range
            (bits as f32 / u64::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

fn populated_engine(dir: &TempDir, metric: DistanceMetric, size: usize) -> IndexEngine {
    let engine = IndexEngine::open(IndexConfig::new(
        DIMENSION,
        metric,
        dir.path().join("bench.vdx"),
    ))
    .unwrap();
    for i in 0..size as u64 {
        engine
            .add_vector(
                Some(VectorId::new(i + 1)),
                &random_vector(DIMENSION, BENCH_SEED ^ i),
                None,
            )
            .unwrap();
    }
    engine
}

// ============================================================================
// Benchmarks
// ============================================================================

fn vector_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_insert");
    group.throughput(Throughput::Elements(1));

    let dir = TempDir::new().unwrap();
    let engine = populated_engine(&dir, DistanceMetric::L2, 0);
    let mut seed = BENCH_SEED;
    group.bench_function("single", |b| {
        b.iter(|| {
            seed = seed.wrapping_add(1);
            let v = random_vector(DIMENSION, seed);
            black_box(engine.add_vector(None, &v, None).unwrap())
        })
    });
    group.finish();
}

fn vector_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_search");

    for size in [1_000usize, 10_000] {
        let dir = TempDir::new().unwrap();
        let engine = populated_engine(&dir, DistanceMetric::L2, size);
        let query = random_vector(DIMENSION, BENCH_SEED.rotate_left(7));

        for k in [1usize, 10, 100] {
            group.bench_with_input(
                BenchmarkId::new(format!("n_{}", size), k),
                &k,
                |b, &k| b.iter(|| black_box(engine.search(&query, k).unwrap())),
            );
        }
    }
    group.finish();
}

fn vector_metric_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_metric_comparison");

    for metric in [DistanceMetric::L2, DistanceMetric::Cosine] {
        let dir = TempDir::new().unwrap();
        let engine = populated_engine(&dir, metric, 5_000);
        let query = random_vector(DIMENSION, BENCH_SEED.rotate_left(13));

        group.bench_function(format!("search/{}", metric), |b| {
            b.iter(|| black_box(engine.search(&query, 10).unwrap()))
        });
    }
    group.finish();
}

fn vector_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_snapshot");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let dir = TempDir::new().unwrap();
    let engine = populated_engine(&dir, DistanceMetric::L2, 10_000);
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("save/n_10000", |b| b.iter(|| black_box(engine.save().unwrap())));
    group.finish();
}

criterion_group!(
    benches,
    vector_insert,
    vector_search,
    vector_metric_comparison,
    vector_snapshot
);
criterion_main!(benches);
