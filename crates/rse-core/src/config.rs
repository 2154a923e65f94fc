//! Experiment configuration loaded once at process entry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{ErrorInfo, RseError};
use crate::stage::Stage;

/// Delimiter reserved by artifact filenames.
pub const KEY_DELIMITER: char = '_';

fn config_error(code: &str, message: impl Into<String>) -> RseError {
    RseError::Config(ErrorInfo::new(code, message))
}

macro_rules! closed_vocabulary {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant,)+
        }

        impl $name {
            /// Every accepted value in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Identifier used in configuration, filenames and arguments.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RseError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str() == value)
                    .ok_or_else(|| {
                        RseError::Config(
                            ErrorInfo::new(
                                concat!("unknown-", stringify!($name)),
                                format!("'{value}' is not a known {}", stringify!($name)),
                            )
                            .with_hint(
                                Self::ALL
                                    .iter()
                                    .map(|v| v.as_str())
                                    .collect::<Vec<_>>()
                                    .join(", "),
                            ),
                        )
                    })
            }
        }
    };
}

closed_vocabulary!(
    /// Data pruning technique applied before splitting.
    PruneTechnique {
        /// Drop rows flagged as outliers.
        RemoveOutliers => "remove-outliers",
        /// Drop duplicated rows.
        RemoveDuplicates => "remove-duplicates",
        /// Keep the cleaned data as is.
        None => "none",
    }
);

closed_vocabulary!(
    /// Regression model family fitted per fold.
    ModelName {
        /// Decision tree regressor.
        DecisionTree => "decision_tree",
        /// k nearest neighbours regressor.
        Knn => "knn",
        /// Ordinary least squares.
        LinearRegression => "linear_regression",
    }
);

closed_vocabulary!(
    /// How the model fitting seed is chosen.
    SeedMode {
        /// Fresh random seed per fit, harvested for replay.
        Random => "random",
        /// Constant seed shared by every fit.
        Static => "static",
    }
);

/// External command used to run the six subprocess stage bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCommand {
    /// Interpreter or executable invoked for every body.
    #[serde(default = "default_program")]
    pub program: String,
    /// Script per stage name, merged over the defaults.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    /// Working directory of the spawned process.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_script(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Clean => Some("clean_data.py"),
        Stage::Prune => Some("prune_data.py"),
        Stage::Split => Some("generate_splits.py"),
        Stage::Fit => Some("fit_ML.py"),
        Stage::Predict => Some("make_predictions.py"),
        Stage::Evaluate => Some("evaluate_predictions.py"),
        Stage::Report | Stage::Plot => None,
    }
}

impl Default for StageCommand {
    fn default() -> Self {
        Self {
            program: default_program(),
            scripts: BTreeMap::new(),
            workdir: default_workdir(),
        }
    }
}

impl StageCommand {
    /// Script run for the given stage; `None` for in-process stages.
    pub fn script_for(&self, stage: Stage) -> Option<String> {
        let fallback = default_script(stage)?;
        Some(
            self.scripts
                .get(stage.name())
                .cloned()
                .unwrap_or_else(|| fallback.to_string()),
        )
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_seed_book() -> PathBuf {
    PathBuf::from("project_seeds.json")
}

fn default_plot_topn() -> Vec<u32> {
    vec![1, 5, 10]
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
    })
}

/// Immutable description of one experiment sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Dataset identifiers.
    #[serde(rename = "DATA_SET_NAMES")]
    pub datasets: Vec<String>,
    /// Pruning techniques to sweep.
    #[serde(rename = "PRUNE_TECHNIQUES")]
    pub prune_techniques: Vec<PruneTechnique>,
    /// Split technique identifiers, opaque to the orchestrator.
    #[serde(rename = "SPLIT_TECHNIQUES")]
    pub split_techniques: Vec<String>,
    /// Number of folds produced by every split.
    #[serde(rename = "NUM_FOLDS")]
    pub num_folds: u32,
    /// Models to fit.
    #[serde(rename = "MLMODELS")]
    pub models: Vec<ModelName>,
    /// Seeding modes for model fitting.
    #[serde(rename = "ML_SEEDING")]
    pub seed_modes: Vec<SeedMode>,
    /// Replay harvested seeds instead of drawing fresh ones.
    #[serde(rename = "REPRODUCIBILITY_MODE", deserialize_with = "truthy")]
    pub reproducibility: bool,
    /// Prediction batches per fitted model.
    #[serde(rename = "NUM_BATCHES")]
    pub num_batches: u32,
    /// Top-N cutoffs evaluated per batch.
    #[serde(rename = "TOPN_SCORES")]
    pub topn_scores: Vec<u32>,
    /// Root of the artifact store.
    #[serde(rename = "DATA_ROOT", default = "default_data_root")]
    pub data_root: PathBuf,
    /// Location of the harvested seed book.
    #[serde(rename = "SEED_BOOK", default = "default_seed_book")]
    pub seed_book: PathBuf,
    /// Cutoffs kept in the plot tables.
    #[serde(rename = "PLOT_TOPN", default = "default_plot_topn")]
    pub plot_topn: Vec<u32>,
    /// External stage body invocation.
    #[serde(rename = "STAGE_COMMAND", default)]
    pub stage_command: StageCommand,
}

impl ExperimentConfig {
    /// Parses and validates a JSON document. Relative paths are anchored at `base_dir`.
    pub fn from_json_str(text: &str, base_dir: &Path) -> Result<Self, RseError> {
        let mut config: ExperimentConfig = serde_json::from_str(text).map_err(|err| {
            RseError::Config(
                ErrorInfo::new("config-parse", err.to_string())
                    .with_context("line", err.line().to_string()),
            )
        })?;
        config.anchor_paths(base_dir);
        config.validate()?;
        Ok(config)
    }

    fn anchor_paths(&mut self, base_dir: &Path) {
        for path in [
            &mut self.data_root,
            &mut self.seed_book,
            &mut self.stage_command.workdir,
        ] {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }

    /// Checks every invariant the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<(), RseError> {
        require_non_empty("DATA_SET_NAMES", &self.datasets)?;
        require_non_empty("PRUNE_TECHNIQUES", &self.prune_techniques)?;
        require_non_empty("SPLIT_TECHNIQUES", &self.split_techniques)?;
        require_non_empty("MLMODELS", &self.models)?;
        require_non_empty("ML_SEEDING", &self.seed_modes)?;
        require_non_empty("TOPN_SCORES", &self.topn_scores)?;

        for name in &self.datasets {
            validate_identifier("DATA_SET_NAMES", name)?;
        }
        for name in &self.split_techniques {
            validate_identifier("SPLIT_TECHNIQUES", name)?;
        }

        require_distinct("DATA_SET_NAMES", &self.datasets)?;
        require_distinct("PRUNE_TECHNIQUES", &self.prune_techniques)?;
        require_distinct("SPLIT_TECHNIQUES", &self.split_techniques)?;
        require_distinct("MLMODELS", &self.models)?;
        require_distinct("ML_SEEDING", &self.seed_modes)?;
        require_distinct("TOPN_SCORES", &self.topn_scores)?;

        if self.num_folds < 2 {
            return Err(RseError::Config(
                ErrorInfo::new("num-folds", "NUM_FOLDS must be at least 2")
                    .with_context("value", self.num_folds.to_string()),
            ));
        }
        if self.num_batches < 1 {
            return Err(config_error("num-batches", "NUM_BATCHES must be at least 1"));
        }
        for (field, values) in [("TOPN_SCORES", &self.topn_scores), ("PLOT_TOPN", &self.plot_topn)] {
            if values.iter().any(|value| *value == 0) {
                return Err(config_error(
                    "topn",
                    format!("{field} entries must be positive"),
                ));
            }
        }
        Ok(())
    }

    /// Fold indices `0..NUM_FOLDS`.
    pub fn folds(&self) -> impl Iterator<Item = u32> {
        0..self.num_folds
    }

    /// Batch indices `0..NUM_BATCHES`.
    pub fn batches(&self) -> impl Iterator<Item = u32> {
        0..self.num_batches
    }
}

fn require_non_empty<T>(field: &str, values: &[T]) -> Result<(), RseError> {
    if values.is_empty() {
        return Err(config_error("empty-list", format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_distinct<T: Ord + fmt::Debug>(field: &str, values: &[T]) -> Result<(), RseError> {
    let mut seen = BTreeSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(RseError::Config(
                ErrorInfo::new("duplicate-entry", format!("{field} lists {value:?} twice")),
            ));
        }
    }
    Ok(())
}

/// Rejects identifiers that would break artifact keys or escape the store root.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), RseError> {
    let reason = if value.is_empty() {
        Some("is empty")
    } else if value.contains(KEY_DELIMITER) {
        Some("contains the key delimiter '_'")
    } else if value.contains('/') || value.contains('\\') {
        Some("contains a path separator")
    } else if value.chars().all(|c| c == '.') {
        Some("is a relative path component")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(RseError::Config(
            ErrorInfo::new("invalid-identifier", format!("{field} entry '{value}' {reason}"))
                .with_context("field", field),
        )),
        None => Ok(()),
    }
}

/// Reads, parses and validates the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<ExperimentConfig, RseError> {
    let text = fs::read_to_string(path).map_err(|err| {
        RseError::Config(
            ErrorInfo::new("config-read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    let base_dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ExperimentConfig::from_json_str(&text, base_dir).map_err(|err| match err {
        RseError::Config(info) => {
            RseError::Config(info.with_context("path", path.display().to_string()))
        }
        other => other,
    })
}
