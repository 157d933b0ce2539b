//! Benchmarks for MAP classification and sampling.
//!
//! Run with:
//! - `cargo bench --bench prediction`
//! - `cargo bench --bench prediction --features parallel`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mctbnc_core::{Dataset, MultiCtbnc, MultiCtbncConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

fn make_dataset(sequences: usize, classes: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let class_names: Vec<String> = (0..classes).map(|c| format!("C{c}")).collect();
    let mut columns = vec!["t".to_string()];
    columns.extend(class_names.iter().cloned());
    columns.extend(["X0", "X1", "X2"].iter().map(|s| s.to_string()));
    let mut blocks = Vec::with_capacity(sequences);
    for _ in 0..sequences {
        let labels: Vec<String> = (0..classes).map(|_| format!("v{}", rng.gen_range(0..2))).collect();
        let mut t = 0.0;
        let mut block = Vec::new();
        for _ in 0..30 {
            let mut row = vec![format!("{t}")];
            row.extend(labels.iter().cloned());
            row.extend((0..3).map(|_| format!("s{}", rng.gen_range(0..3))));
            block.push(row);
            t += rng.gen_range(0.05..0.5);
        }
        blocks.push(block);
    }
    let class_refs: Vec<&str> = class_names.iter().map(String::as_str).collect();
    Dataset::from_records("t", &class_refs, &columns, &blocks)
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict");
    for classes in [1_usize, 2, 4] {
        let dataset = Arc::new(make_dataset(64, classes, classes as u64));
        let mut clf = MultiCtbnc::new(MultiCtbncConfig::default());
        clf.learn(dataset.clone()).unwrap();

        group.bench_with_input(BenchmarkId::new("class_variables", classes), &dataset, |b, ds| {
            b.iter(|| black_box(clf.predict(black_box(ds), true).unwrap()));
        });
    }
    group.finish();
}

fn bench_sample(c: &mut Criterion) {
    let dataset = Arc::new(make_dataset(64, 2, 11));
    let mut clf = MultiCtbnc::new(MultiCtbncConfig::default());
    clf.learn(dataset).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(3);

    c.bench_function("sample_sequence", |b| {
        b.iter(|| black_box(clf.sample(black_box(10.0), &mut rng).unwrap()));
    });
}

criterion_group!(benches, bench_predict, bench_sample);
criterion_main!(benches);
