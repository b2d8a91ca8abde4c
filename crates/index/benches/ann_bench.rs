use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use index::{AnnConfig, AnnIndex};
use std::hint::black_box;

/// Unit-length random vectors, matching what the embedders emit.
fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..count)
        .map(|_| {
            let mut v: Vec<f32> = (0..dim).map(|_| rng.f32() - 0.5).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.iter_mut().for_each(|x| *x /= norm);
            v
        })
        .collect()
}

/// Index build time at different catalog sizes
fn bench_ann_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("ann_build");
    group.sample_size(10);
    let dim = 128;

    for size in [500, 2000] {
        let vectors = random_vectors(size, dim, 7);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &vectors, |b, vectors| {
            b.iter(|| AnnIndex::build(black_box(vectors), AnnConfig::default().with_m(16).with_min_vectors_for_ann(0)))
        });
    }

    group.finish();
}

/// HNSW search vs exhaustive scan
fn bench_ann_vs_linear(c: &mut Criterion) {
    let mut group = c.benchmark_group("ann_vs_linear");
    let dim = 128;

    for size in [1000, 5000] {
        let vectors = random_vectors(size, dim, 11);
        let query = random_vectors(1, dim, 13).remove(0);
        let Ok(index) = AnnIndex::build(&vectors, AnnConfig::default().with_m(16).with_min_vectors_for_ann(0)) else {
            continue;
        };

        group.bench_function(format!("linear_{size}"), |b| {
            b.iter(|| index.search_exact(black_box(&query), black_box(10)))
        });
        group.bench_function(format!("hnsw_{size}"), |b| {
            b.iter(|| index.search(black_box(&query), black_box(10)))
        });
    }

    group.finish();
}

/// Search cost as top_k grows
fn bench_ann_top_k(c: &mut Criterion) {
    let mut group = c.benchmark_group("ann_top_k");
    let dim = 128;
    let vectors = random_vectors(3000, dim, 17);
    let query = random_vectors(1, dim, 19).remove(0);
    let Ok(index) = AnnIndex::build(&vectors, AnnConfig::default().with_m(16).with_min_vectors_for_ann(0)) else {
        return;
    };

    for k in [1, 5, 10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, &k| {
            b.iter(|| index.search(black_box(&query), black_box(k)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ann_build, bench_ann_vs_linear, bench_ann_top_k);
criterion_main!(benches);
