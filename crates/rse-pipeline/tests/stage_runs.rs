use std::fs;
use std::path::{Path, PathBuf};

use rse_core::config::{ExperimentConfig, ModelName, SeedMode};
use rse_core::{RseError, Stage};
use rse_exp::{harvest, read_seed_file, ArtifactStore, SeedBook};
use rse_pipeline::{
    dispatch, dispatch_index, plan, run_unit, BodyInvocation, RunOptions, StageBody, StageReport,
    UnitOutcome,
};

const SWEEP: &str = r#"{
    "DATA_SET_NAMES": ["WeatherData"],
    "PRUNE_TECHNIQUES": ["none"],
    "SPLIT_TECHNIQUES": ["random"],
    "NUM_FOLDS": 2,
    "MLMODELS": ["decision_tree", "knn"],
    "ML_SEEDING": ["random"],
    "REPRODUCIBILITY_MODE": false,
    "NUM_BATCHES": 1,
    "TOPN_SCORES": [1],
    "DATA_ROOT": "data",
    "SEED_BOOK": "project_seeds.json"
}"#;

fn config(base: &Path) -> ExperimentConfig {
    ExperimentConfig::from_json_str(SWEEP, base).unwrap()
}

fn echo(invocation: &BodyInvocation<'_>) -> Result<(), RseError> {
    for name in invocation.outputs {
        let line = format!("{} {}\n", invocation.stage, invocation.tuple);
        fs::write(invocation.output_dir.join(name), line).unwrap();
    }
    Ok(())
}

fn run(cfg: &ExperimentConfig, stage: Stage, seed: u64) -> StageReport {
    let opts = RunOptions {
        jobs: 1,
        seed: Some(seed),
    };
    dispatch(cfg, stage, &echo, &opts).unwrap()
}

fn run_through(cfg: &ExperimentConfig, last: Stage) {
    for stage in Stage::ALL.into_iter().take(last.index() + 1) {
        let report = run(cfg, stage, 11);
        assert!(!report.has_failures(), "{stage} failed: {:?}", report.failures);
    }
}

fn staging_dirs(root: &Path) -> usize {
    fs::read_dir(root)
        .unwrap()
        .filter(|entry| {
            entry
                .as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with(".staging-")
        })
        .count()
}

#[test]
fn second_run_skips_and_keeps_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let cleaned = cfg.data_root.join("WeatherData/clean/cleaned.csv");

    let first = run(&cfg, Stage::Clean, 1);
    assert_eq!((first.executed, first.skipped), (1, 0));
    let bytes = fs::read(&cleaned).unwrap();

    let second = run(&cfg, Stage::Clean, 2);
    assert_eq!((second.executed, second.skipped), (0, 1));
    assert_eq!(fs::read(&cleaned).unwrap(), bytes);
    assert_eq!(staging_dirs(&cfg.data_root), 0);
}

#[test]
fn run_unit_invokes_body_once() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let store = ArtifactStore::new(&cfg.data_root);
    let units = plan(&cfg, Stage::Clean, &RunOptions::default()).unwrap();
    assert_eq!(units.len(), 1);

    assert_eq!(run_unit(&store, &units[0], &echo), UnitOutcome::Executed);
    assert_eq!(run_unit(&store, &units[0], &echo), UnitOutcome::Skipped);
}

#[test]
fn missing_inputs_block_the_unit() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());

    let report = run(&cfg, Stage::Prune, 1);
    assert_eq!(report.blocked, 1);
    assert_eq!(report.executed, 0);
    assert!(!report.has_failures());
    assert!(!cfg.data_root.join("WeatherData/prune/none_pruned.csv").exists());
}

#[test]
fn failing_body_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    fn failing(invocation: &BodyInvocation<'_>) -> Result<(), RseError> {
        for name in invocation.outputs {
            fs::write(invocation.output_dir.join(name), "partial").unwrap();
        }
        Err(RseError::Stage(rse_core::ErrorInfo::new(
            "exit-status",
            "body exited with status 1",
        )))
    }

    let report = dispatch(&cfg, Stage::Clean, &failing, &RunOptions::default()).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].unit.contains("WeatherData"));
    assert!(!cfg.data_root.join("WeatherData/clean/cleaned.csv").exists());
    assert_eq!(staging_dirs(&cfg.data_root), 0);

    // The failure is retried on the next invocation.
    let retry = run(&cfg, Stage::Clean, 1);
    assert_eq!(retry.executed, 1);
}

#[test]
fn body_without_outputs_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    fn silent(_: &BodyInvocation<'_>) -> Result<(), RseError> {
        Ok(())
    }

    let report = dispatch(&cfg, Stage::Clean, &silent, &RunOptions::default()).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(!cfg.data_root.join("WeatherData/clean/cleaned.csv").exists());
}

#[test]
fn fresh_splits_twice_then_replay_skips() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    run_through(&cfg, Stage::Prune);
    let store = ArtifactStore::new(&cfg.data_root);

    assert_eq!(run(&cfg, Stage::Split, 1).executed, 1);
    assert_eq!(run(&cfg, Stage::Split, 2).executed, 1);
    let shuffles = store.all_shuffle_seeds("WeatherData").unwrap();
    assert_eq!(shuffles.len(), 2);
    let split_files = fs::read_dir(cfg.data_root.join("WeatherData/split"))
        .unwrap()
        .count();
    assert_eq!(split_files, 4);

    let replayed = *shuffles.iter().next().unwrap();
    let mut book = SeedBook::new();
    book.insert("WeatherData", replayed, ModelName::Knn, 0, 5);
    book.store(&cfg.seed_book).unwrap();
    cfg.reproducibility = true;

    let report = run(&cfg, Stage::Split, 3);
    assert_eq!(report.planned, 1);
    assert_eq!((report.executed, report.skipped), (0, 1));
    assert_eq!(store.all_shuffle_seeds("WeatherData").unwrap(), shuffles);
}

#[test]
fn stage_index_out_of_range_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    for index in [9, 8, -1] {
        let err = dispatch_index(&cfg, index, &echo, &RunOptions::default()).unwrap_err();
        assert!(matches!(err, RseError::Config(_)), "{index}: {err}");
    }
    assert!(!cfg.data_root.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn replay_without_seed_book_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.reproducibility = true;
    let err = dispatch(&cfg, Stage::Fit, &echo, &RunOptions::default()).unwrap_err();
    assert!(matches!(err, RseError::Config(_)));
}

#[test]
fn replayed_fit_reproduces_the_harvest() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    run_through(&cfg, Stage::Split);
    assert_eq!(run(&cfg, Stage::Fit, 4).executed, 4);

    let store = ArtifactStore::new(&cfg.data_root);
    let first = harvest(&cfg, &store).unwrap();
    assert_eq!(first.len(), 4);
    first.store(&cfg.seed_book).unwrap();

    for model in ["model_decision_tree", "model_knn"] {
        fs::remove_dir_all(cfg.data_root.join("WeatherData").join(model)).unwrap();
    }
    cfg.reproducibility = true;
    assert_eq!(run(&cfg, Stage::Fit, 99).executed, 4);

    let second = harvest(&cfg, &store).unwrap();
    assert_eq!(second, first);
}

#[test]
fn missing_seed_skips_unit_and_blocks_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    run_through(&cfg, Stage::Split);
    assert_eq!(run(&cfg, Stage::Fit, 4).executed, 4);

    let store = ArtifactStore::new(&cfg.data_root);
    let full = harvest(&cfg, &store).unwrap();
    let shuffle = store.all_shuffle_seeds("WeatherData").unwrap().into_iter().next().unwrap();
    let mut partial = SeedBook::new();
    for fold in 0..2 {
        let seed = full.resolve("WeatherData", shuffle, ModelName::Knn, fold).unwrap();
        partial.insert("WeatherData", shuffle, ModelName::Knn, fold, seed);
    }
    partial.store(&cfg.seed_book).unwrap();

    for model in ["model_decision_tree", "model_knn"] {
        fs::remove_dir_all(cfg.data_root.join("WeatherData").join(model)).unwrap();
    }
    cfg.reproducibility = true;
    let fit = run(&cfg, Stage::Fit, 5);
    assert_eq!((fit.executed, fit.seed_missing), (2, 2));
    assert!(!fit.has_failures());

    let predict = run(&cfg, Stage::Predict, 5);
    assert_eq!((predict.executed, predict.blocked), (2, 2));
}

#[test]
fn parallel_run_matches_sequential_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    run_through(&cfg, Stage::Split);
    let opts = RunOptions {
        jobs: 4,
        seed: Some(4),
    };
    let report = dispatch(&cfg, Stage::Fit, &echo, &opts).unwrap();
    assert_eq!(report.executed, 4);
    assert_eq!(run(&cfg, Stage::Fit, 4).skipped, 4);
}

#[test]
fn static_fits_replay_with_seed_42() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.seed_modes = vec![SeedMode::Static];
    run_through(&cfg, Stage::Split);
    let store = ArtifactStore::new(&cfg.data_root);
    let book = harvest(&cfg, &store).unwrap();
    assert_eq!(book.len(), 0);
    book.store(&cfg.seed_book).unwrap();
    cfg.reproducibility = true;

    let opts = RunOptions {
        jobs: 1,
        seed: Some(8),
    };
    let units = plan(&cfg, Stage::Fit, &opts).unwrap();
    assert_eq!(units.len(), 4);
    for unit in &units {
        assert!(unit.unresolved.is_none());
        let seed = unit
            .args
            .iter()
            .find(|arg| arg.name == "reproducibility_seed")
            .unwrap();
        assert_eq!(seed.values, vec!["42".to_string()]);
        assert_eq!(unit.side_files[0].contents, "42\n");
    }

    assert_eq!(run(&cfg, Stage::Fit, 8).executed, 4);
    for unit in &units {
        let path = store.root().join(&unit.side_files[0].path);
        assert_eq!(read_seed_file(&path).unwrap(), 42);
    }
}

#[test]
fn static_only_sweep_replays_its_splits() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.seed_modes = vec![SeedMode::Static];
    run_through(&cfg, Stage::Split);
    assert_eq!(run(&cfg, Stage::Fit, 4).executed, 4);

    let store = ArtifactStore::new(&cfg.data_root);
    harvest(&cfg, &store).unwrap().store(&cfg.seed_book).unwrap();
    cfg.reproducibility = true;

    let split = run(&cfg, Stage::Split, 5);
    assert_eq!(split.planned, 1);
    assert_eq!((split.executed, split.skipped), (0, 1));
}

/// Publishes the unit's model and seed file itself, as a concurrent runner
/// finishing the same fit first would.
struct ConcurrentWinner {
    model: PathBuf,
    seed_file: PathBuf,
}

impl StageBody for ConcurrentWinner {
    fn run(&self, invocation: &BodyInvocation<'_>) -> Result<(), RseError> {
        fs::create_dir_all(self.model.parent().unwrap()).unwrap();
        fs::write(&self.seed_file, "777\n").unwrap();
        fs::write(&self.model, "winner").unwrap();
        echo(invocation)
    }
}

#[test]
fn losing_a_publish_race_keeps_the_winner_seed() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    run_through(&cfg, Stage::Split);
    let store = ArtifactStore::new(&cfg.data_root);
    let opts = RunOptions {
        jobs: 1,
        seed: Some(6),
    };
    let units = plan(&cfg, Stage::Fit, &opts).unwrap();
    let unit = &units[0];
    let body = ConcurrentWinner {
        model: store.path_for(&unit.outputs[0]),
        seed_file: store.root().join(&unit.side_files[0].path),
    };

    assert_eq!(run_unit(&store, unit, &body), UnitOutcome::Executed);
    assert_eq!(fs::read_to_string(&body.model).unwrap(), "winner");
    assert_eq!(read_seed_file(&body.seed_file).unwrap(), 777);
}
