// Throughput benchmarks for the screening pipeline
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fraudx_core::{ApplicationRecord, EmbeddingStore, ModelConfig, StoredCase, Vector};
use fraudx_schema::FittedEncoderState;
use fraudx_storage::MemoryStore;
use rand::prelude::*;
use serde_json::json;

const STATES: [&str; 6] = ["CA", "NY", "TX", "FL", "NV", "WA"];

fn config() -> ModelConfig {
    ModelConfig::from_json_str(
        r#"{
            "name": "bench",
            "fields": [
                {"name": "business_name", "type": "string"},
                {"name": "email", "type": "string"},
                {"name": "state", "type": "string", "required": false},
                {"name": "annual_volume", "type": "float", "required": false}
            ],
            "feature_groups": [
                {"name": "contact", "fields": ["email"], "transformer": {"kind": "hash"}, "weight": 2.0},
                {"name": "name", "fields": ["business_name"], "transformer": {"kind": "tfidf", "variant": "vocabulary"}},
                {"name": "region", "fields": ["state"], "transformer": {"kind": "onehot"}},
                {"name": "volume", "fields": ["annual_volume"], "transformer": {"kind": "scaler"}}
            ],
            "embedding_dim": 32,
            "reducer": {"kind": "pca"}
        }"#,
    )
    .unwrap()
}

fn generate_application(rng: &mut impl Rng, id: usize) -> ApplicationRecord {
    ApplicationRecord::from_value(json!({
        "business_name": format!("Merchant {} Trading Co", id),
        "email": format!("owner{}@merchant{}.com", id, rng.random_range(0..500)),
        "state": STATES[rng.random_range(0..STATES.len())],
        "annual_volume": rng.random_range(1_000.0..5_000_000.0),
    }))
    .unwrap()
}

fn generate_corpus(size: usize) -> Vec<ApplicationRecord> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..size).map(|i| generate_application(&mut rng, i)).collect()
}

fn generate_random_vector(rng: &mut impl Rng, dim: usize) -> Vector {
    Vector::new((0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect())
}

fn benchmark_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);
    let config = config();

    for size in [100, 1000].iter() {
        let corpus = generate_corpus(*size);
        group.bench_with_input(BenchmarkId::new("pca", size), &corpus, |b, corpus| {
            b.iter(|| FittedEncoderState::fit(black_box(&config), black_box(corpus)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_assemble(c: &mut Criterion) {
    let corpus = generate_corpus(500);
    let state = FittedEncoderState::fit(&config(), &corpus).unwrap();

    c.bench_function("assemble", |b| {
        let mut i = 0;
        b.iter(|| {
            let record = &corpus[i % corpus.len()];
            i += 1;
            state.assemble(black_box(record)).unwrap()
        });
    });
}

fn benchmark_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_nearest");
    let mut rng = StdRng::seed_from_u64(7);

    for size in [100, 1000, 10000].iter() {
        let store = MemoryStore::new(32);
        for i in 0..*size {
            let case = StoredCase::new(
                format!("m{}", i),
                generate_random_vector(&mut rng, 32),
                ApplicationRecord::new(),
            );
            store.put(case).unwrap();
        }
        let query = generate_random_vector(&mut rng, 32);

        group.bench_with_input(BenchmarkId::new("memory", size), &store, |b, store| {
            b.iter(|| store.query_nearest(black_box(&query), 0.6, 5).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_fit, benchmark_assemble, benchmark_query);
criterion_main!(benches);
