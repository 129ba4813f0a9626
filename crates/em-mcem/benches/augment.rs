use criterion::{black_box, criterion_group, criterion_main, Criterion};
use em_math::random_numbers::Reng;
use em_mcem::augment_tree;
use em_models::Rpd1;
use em_tree::Tree;

fn bench_augment(c: &mut Criterion) {
    let brts: Vec<f64> = (1..=20).rev().map(|i| i as f64).collect();
    let input = Tree::from_branching_times(&brts, 2.0).unwrap();
    let pars = [0.2, 0.8, 0.0];
    let mut pooled = Tree::default();
    let mut rng = Reng::new(42);

    c.bench_function("augment_rpd1_20_tips", |b| {
        b.iter(|| {
            augment_tree(
                black_box(&pars),
                black_box(&input),
                &Rpd1,
                10_000,
                500.0,
                &mut pooled,
                true,
                &mut rng,
            )
            .unwrap();
            pooled.len()
        })
    });
}

criterion_group!(benches, bench_augment);
criterion_main!(benches);
