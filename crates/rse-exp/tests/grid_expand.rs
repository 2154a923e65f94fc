use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use rse_core::config::{ExperimentConfig, PruneTechnique};
use rse_core::rng::RngHandle;
use rse_core::{RseError, Stage};
use rse_exp::{
    encode, expand, grid_size, ArtifactStore, SeedBook, ShuffleSeedSource, SplitSeeds,
};

struct SingleSeed(u64);

impl ShuffleSeedSource for SingleSeed {
    fn shuffle_seeds(
        &self,
        _dataset: &str,
        _prune: PruneTechnique,
        _split: &str,
    ) -> Result<BTreeSet<u64>, RseError> {
        Ok(BTreeSet::from([self.0]))
    }
}

const BASE: &str = r#"{
    "DATA_SET_NAMES": ["WeatherData", "Housing"],
    "PRUNE_TECHNIQUES": ["remove-outliers", "remove-duplicates", "none"],
    "SPLIT_TECHNIQUES": ["random", "stratified"],
    "NUM_FOLDS": 5,
    "MLMODELS": ["linear_regression"],
    "ML_SEEDING": ["random"],
    "REPRODUCIBILITY_MODE": false,
    "NUM_BATCHES": 3,
    "TOPN_SCORES": [1, 5, 10]
}"#;

fn config() -> ExperimentConfig {
    ExperimentConfig::from_json_str(BASE, Path::new("/tmp")).unwrap()
}

#[test]
fn fit_grid_has_sixty_base_units() {
    let cfg = config();
    let mut rng = RngHandle::from_seed(0);
    let tuples = expand(&cfg, Stage::Fit, &SingleSeed(7), &mut SplitSeeds::Fresh(&mut rng)).unwrap();
    assert_eq!(tuples.len(), 60);
    assert_eq!(grid_size(&cfg, Stage::Fit, 1), 60);

    let keys: BTreeSet<_> = tuples
        .iter()
        .map(|t| encode(t, Stage::Fit).unwrap().relative_path())
        .collect();
    assert_eq!(keys.len(), 60);
}

#[test]
fn every_stage_matches_its_grid_size() {
    let cfg = config();
    for stage in Stage::ALL {
        let mut rng = RngHandle::from_seed(0);
        let tuples = expand(&cfg, stage, &SingleSeed(7), &mut SplitSeeds::Fresh(&mut rng)).unwrap();
        assert_eq!(tuples.len() as u64, grid_size(&cfg, stage, 1), "{stage}");
        for tuple in &tuples {
            encode(tuple, stage).unwrap();
        }
    }
}

#[test]
fn expansion_is_deterministic() {
    let cfg = config();
    let mut rng_a = RngHandle::from_seed(11);
    let mut rng_b = RngHandle::from_seed(11);
    let a = expand(&cfg, Stage::Split, &SingleSeed(7), &mut SplitSeeds::Fresh(&mut rng_a)).unwrap();
    let b = expand(&cfg, Stage::Split, &SingleSeed(7), &mut SplitSeeds::Fresh(&mut rng_b)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn recorded_split_seeds_replay_every_book_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seeds.json");
    fs::write(
        &path,
        r#"{"WeatherData": {"7": {"knn": {"0": 1}}, "13": {"knn": {"0": 2}}}}"#,
    )
    .unwrap();
    let book = SeedBook::load(&path).unwrap();

    let cfg = config();
    let tuples = expand(&cfg, Stage::Split, &SingleSeed(0), &mut SplitSeeds::Recorded(&book)).unwrap();
    let weather: BTreeSet<u64> = tuples
        .iter()
        .filter(|t| t.dataset() == Some("WeatherData"))
        .filter_map(|t| t.shuffle_seed())
        .collect();
    assert_eq!(weather, BTreeSet::from([7, 13]));
    assert!(tuples.iter().all(|t| t.dataset() == Some("WeatherData")));
    assert_eq!(tuples.len() as u64, 3 * 2 * 2 * 5);
}

#[test]
fn store_discovers_shuffle_seeds_for_matching_pair_only() {
    let dir = tempfile::tempdir().unwrap();
    let split_dir = dir.path().join("WeatherData/split");
    fs::create_dir_all(&split_dir).unwrap();
    for name in [
        "0_7_none_random_split.csv",
        "1_7_none_random_split.csv",
        "0_3_none_random_split.csv",
        "0_5_remove-outliers_random_split.csv",
        "0_8_none_stratified_split.csv",
        "README.md",
    ] {
        fs::write(split_dir.join(name), "").unwrap();
    }
    let store = ArtifactStore::new(dir.path());
    let seeds = store
        .shuffle_seeds("WeatherData", PruneTechnique::None, "random")
        .unwrap();
    assert_eq!(seeds, BTreeSet::from([3, 7]));
    assert!(store
        .shuffle_seeds("Housing", PruneTechnique::None, "random")
        .unwrap()
        .is_empty());
}
