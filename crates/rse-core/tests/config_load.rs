use std::fs;
use std::path::Path;

use rse_core::config::{load_config, ExperimentConfig, ModelName, PruneTechnique, SeedMode};
use rse_core::RseError;

const SAMPLE: &str = r#"{
    "DATA_SET_NAMES": ["WeatherData", "Housing"],
    "PRUNE_TECHNIQUES": ["remove-outliers", "remove-duplicates", "none"],
    "SPLIT_TECHNIQUES": ["random", "stratified"],
    "NUM_FOLDS": 5,
    "MLMODELS": ["decision_tree", "knn"],
    "ML_SEEDING": ["random", "static"],
    "REPRODUCIBILITY_MODE": 0,
    "NUM_BATCHES": 2,
    "TOPN_SCORES": [1, 5, 10]
}"#;

fn with_field(field: &str, value: &str) -> String {
    let mut doc: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
    doc[field] = serde_json::from_str(value).unwrap();
    doc.to_string()
}

fn expect_config_error(text: &str) {
    let err = ExperimentConfig::from_json_str(text, Path::new("/tmp")).unwrap_err();
    assert!(matches!(err, RseError::Config(_)), "unexpected error {err:?}");
}

#[test]
fn loads_sample_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, SAMPLE).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.datasets, vec!["WeatherData", "Housing"]);
    assert_eq!(config.prune_techniques[0], PruneTechnique::RemoveOutliers);
    assert_eq!(config.models, vec![ModelName::DecisionTree, ModelName::Knn]);
    assert_eq!(config.seed_modes, vec![SeedMode::Random, SeedMode::Static]);
    assert!(!config.reproducibility);
    assert_eq!(config.data_root, dir.path().join("data"));
    assert_eq!(config.seed_book, dir.path().join("project_seeds.json"));
    assert_eq!(config.plot_topn, vec![1, 5, 10]);
    assert_eq!(config.stage_command.program, "python3");
}

#[test]
fn reproducibility_flag_accepts_bool_and_int() {
    let as_bool = with_field("REPRODUCIBILITY_MODE", "true");
    let as_int = with_field("REPRODUCIBILITY_MODE", "1");
    for text in [as_bool, as_int] {
        let config = ExperimentConfig::from_json_str(&text, Path::new("/tmp")).unwrap();
        assert!(config.reproducibility);
    }
}

#[test]
fn absolute_data_root_is_kept() {
    let text = with_field("DATA_ROOT", r#""/srv/artifacts""#);
    let config = ExperimentConfig::from_json_str(&text, Path::new("/tmp")).unwrap();
    assert_eq!(config.data_root, Path::new("/srv/artifacts"));
}

#[test]
fn rejects_unknown_vocabulary() {
    expect_config_error(&with_field("PRUNE_TECHNIQUES", r#"["remove-everything"]"#));
    expect_config_error(&with_field("MLMODELS", r#"["svm"]"#));
    expect_config_error(&with_field("ML_SEEDING", r#"["sometimes"]"#));
}

#[test]
fn rejects_bad_counts_and_identifiers() {
    expect_config_error(&with_field("NUM_FOLDS", "1"));
    expect_config_error(&with_field("NUM_BATCHES", "0"));
    expect_config_error(&with_field("TOPN_SCORES", "[]"));
    expect_config_error(&with_field("TOPN_SCORES", "[0, 5]"));
    expect_config_error(&with_field("DATA_SET_NAMES", r#"["weather_data"]"#));
    expect_config_error(&with_field("SPLIT_TECHNIQUES", r#"["../escape"]"#));
    expect_config_error(&with_field("DATA_SET_NAMES", r#"["A", "A"]"#));
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.info().code, "config-read");
    assert!(err.info().context.contains_key("path"));
}
