// Search, indexing and ratio benchmarks for kpiscope
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kpiscope::{
    FlatIndex, HashingEmbedder, Metadata, RatioCalculator, RatioInputs, StoreConfig, Vector,
    VectorIndex, VectorStore,
};
use rand::prelude::*;

const DIM: usize = 384;

fn generate_random_vector(rng: &mut impl Rng, dim: usize) -> Vector {
    let data: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect();
    Vector::new(data).normalized()
}

fn build_index(size: usize) -> FlatIndex {
    let mut rng = StdRng::seed_from_u64(42);
    let vectors: Vec<Vector> = (0..size).map(|_| generate_random_vector(&mut rng, DIM)).collect();
    let mut index = FlatIndex::new(DIM);
    index.append(&vectors).unwrap();
    index
}

fn benchmark_flat_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_search");
    let mut rng = StdRng::seed_from_u64(7);
    let query = generate_random_vector(&mut rng, DIM);

    // 20k crosses into the parallel scan
    for size in [1_000, 5_000, 20_000].iter() {
        let index = build_index(*size);
        group.bench_with_input(BenchmarkId::new("top5", size), size, |b, _| {
            b.iter(|| index.search(black_box(query.as_slice()), 5, 0.0).unwrap());
        });
    }

    group.finish();
}

fn benchmark_store_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_add");
    group.sample_size(20);
    let mut rng = StdRng::seed_from_u64(11);

    for batch in [10, 100].iter() {
        let vectors: Vec<Vector> = (0..*batch).map(|_| generate_random_vector(&mut rng, DIM)).collect();
        let metadata: Vec<Metadata> = (0..*batch)
            .map(|i| Metadata::new().with("source_id", format!("doc-{}", i)))
            .collect();

        group.bench_with_input(BenchmarkId::new("add_and_flush", batch), batch, |b, _| {
            let dir = tempfile::tempdir().unwrap();
            let store = VectorStore::open(&StoreConfig::new(dir.path(), DIM)).unwrap();
            b.iter(|| {
                store.reset().unwrap();
                store.add(vectors.clone(), metadata.clone()).unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_embedding(c: &mut Criterion) {
    let embedder = HashingEmbedder::new(DIM);
    let text = "Consolidated balance sheet as of 31 December 2023: total assets 1,250,000; \
                current liabilities 310,000; equity 640,000";

    c.bench_function("hashing_embed", |b| {
        b.iter(|| embedder.embed_one(black_box(text)));
    });
}

fn benchmark_ratios(c: &mut Criterion) {
    let calculator = RatioCalculator::new();
    let values: RatioInputs = [
        ("current_assets", 300_000.0),
        ("current_liabilities", 150_000.0),
        ("inventory", 40_000.0),
        ("net_income", 80_000.0),
        ("equity", 400_000.0),
        ("total_assets", 1_000_000.0),
        ("revenue", 800_000.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    c.bench_function("ratio_single", |b| {
        b.iter(|| calculator.calculate(black_box("roe"), &values).unwrap());
    });
    c.bench_function("ratio_available", |b| {
        b.iter(|| calculator.calculate_available(black_box(&values)));
    });
}

criterion_group!(
    benches,
    benchmark_flat_search,
    benchmark_store_add,
    benchmark_embedding,
    benchmark_ratios
);
criterion_main!(benches);
