use criterion::{Criterion, black_box, criterion_group, criterion_main};
use photoid_faceid::{
    Config, IdentityStore, MatchParams, Observation, Resolver, Snapshot, decide,
};

fn random_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(dim);
    let mut state = seed;
    for _ in 0..dim {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        v.push(((state >> 33) as f32) / (u32::MAX as f32));
    }
    v
}

fn bench_decide(c: &mut Criterion) {
    let dim = 128;
    let rt = tokio::runtime::Runtime::new().unwrap();
    let resolver = Resolver::with_memory_store(Config::default()).unwrap();
    let batch: Vec<Observation> = (0..200)
        .map(|i| Observation::new(random_vec(dim, i + 1), format!("p{i}")))
        .collect();
    rt.block_on(resolver.resolve_batch(batch)).unwrap();

    let snapshot: Snapshot = resolver.store().snapshot("person").unwrap();
    let params = MatchParams {
        threshold: 0.30,
        id_prefix: "person".into(),
        first_id: 1,
    };
    let probe = random_vec(dim, 999);

    c.bench_function("faceid_decide_128d_200identities", |b| {
        b.iter(|| {
            let _ = black_box(decide(black_box(&probe), &snapshot, &params));
        });
    });
}

fn bench_resolve_batch(c: &mut Criterion) {
    let dim = 128;
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("faceid_resolve_batch_128d_20faces", |b| {
        b.iter_with_setup(
            || {
                let resolver = Resolver::with_memory_store(Config::default()).unwrap();
                let batch: Vec<Observation> = (0..20)
                    .map(|i| Observation::new(random_vec(dim, i * 31 + 7), "group"))
                    .collect();
                (resolver, batch)
            },
            |(resolver, batch)| {
                let out = rt.block_on(resolver.resolve_batch(batch)).unwrap();
                black_box(out);
            },
        );
    });
}

criterion_group!(benches, bench_decide, bench_resolve_batch);
criterion_main!(benches);
