use std::collections::BTreeSet;
use std::path::Path;

use criterion::{criterion_group, criterion_main, Criterion};
use rse_core::config::{ExperimentConfig, PruneTechnique};
use rse_core::rng::RngHandle;
use rse_core::{RseError, Stage};
use rse_exp::{decode_relative, encode, expand, ShuffleSeedSource, SplitSeeds};

struct Seeds;

impl ShuffleSeedSource for Seeds {
    fn shuffle_seeds(&self, _: &str, _: PruneTechnique, _: &str) -> Result<BTreeSet<u64>, RseError> {
        Ok((0..4).map(|i| 1_000 + i * 17).collect())
    }
}

fn bench_keys(c: &mut Criterion) {
    let text = r#"{
        "DATA_SET_NAMES": ["WeatherData", "Housing", "Wine"],
        "PRUNE_TECHNIQUES": ["remove-outliers", "remove-duplicates", "none"],
        "SPLIT_TECHNIQUES": ["random", "stratified"],
        "NUM_FOLDS": 5,
        "MLMODELS": ["decision_tree", "knn", "linear_regression"],
        "ML_SEEDING": ["random", "static"],
        "REPRODUCIBILITY_MODE": false,
        "NUM_BATCHES": 4,
        "TOPN_SCORES": [1, 5, 10]
    }"#;
    let config = ExperimentConfig::from_json_str(text, Path::new(".")).expect("config");

    c.bench_function("expand_predict_grid", |b| {
        b.iter(|| {
            let mut rng = RngHandle::from_seed(3);
            expand(&config, Stage::Predict, &Seeds, &mut SplitSeeds::Fresh(&mut rng)).expect("expand")
        });
    });

    let mut rng = RngHandle::from_seed(3);
    let tuples =
        expand(&config, Stage::Evaluate, &Seeds, &mut SplitSeeds::Fresh(&mut rng)).expect("expand");
    c.bench_function("encode_decode_evaluate_keys", |b| {
        b.iter(|| {
            for tuple in &tuples {
                let key = encode(tuple, Stage::Evaluate).expect("encode");
                decode_relative(&key.relative_path(), Stage::Evaluate).expect("decode");
            }
        });
    });
}

criterion_group!(benches, bench_keys);
criterion_main!(benches);
