use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use rse_core::config::ExperimentConfig;
use rse_core::errors::{ErrorInfo, RseError};
use rse_core::provenance::RunProvenance;
use rse_core::Stage;
use rse_exp::{
    config_hash, decode_relative, from_json_slice, to_canonical_json_pretty, Dimension,
    ParameterTuple,
};

use crate::body::{BodyInvocation, StageBody};

fn io_error(code: &str, path: &Path, err: impl ToString) -> RseError {
    RseError::Io(ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()))
}

/// Error metrics of one batch at one cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
}

/// Content of one Evaluate artifact: `batch → cutoff → scores`.
pub type BatchScores = BTreeMap<u32, BTreeMap<u32, Scores>>;

/// `fold → batch → cutoff → scores`.
pub type FoldScores = BTreeMap<u32, BatchScores>;
/// `shuffle seed → fold → ...`.
pub type ShuffleScores = BTreeMap<u64, FoldScores>;
/// `seed mode → shuffle seed → ...`.
pub type ModeScores = BTreeMap<String, ShuffleScores>;
/// `model → seed mode → ...`.
pub type ModelScores = BTreeMap<String, ModeScores>;
/// `split → model → ...`.
pub type SplitScores = BTreeMap<String, ModelScores>;
/// `prune → split → ...`.
pub type PruneScores = BTreeMap<String, SplitScores>;

/// Every evaluation of a sweep, keyed from dataset down to cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// How and when the report was produced.
    pub provenance: RunProvenance,
    /// `dataset → prune → split → model → seed mode → shuffle seed → fold → batch → cutoff`.
    pub results: BTreeMap<String, PruneScores>,
}

/// Location of one Evaluate artifact inside the report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Coordinates {
    /// Dataset identifier.
    pub dataset: String,
    /// Pruning technique.
    pub prune: String,
    /// Split technique.
    pub split: String,
    /// Model name.
    pub model: String,
    /// Seed mode.
    pub seed_mode: String,
    /// Shuffle seed.
    pub shuffle_seed: u64,
    /// Held out fold.
    pub fold: u32,
}

impl Coordinates {
    fn from_tuple(tuple: &ParameterTuple) -> Option<Self> {
        Some(Self {
            dataset: tuple.dataset()?.to_string(),
            prune: tuple.text(Dimension::PruneTechnique)?.to_string(),
            split: tuple.split()?.to_string(),
            model: tuple.text(Dimension::ModelName)?.to_string(),
            seed_mode: tuple.text(Dimension::SeedMode)?.to_string(),
            shuffle_seed: tuple.shuffle_seed()?,
            fold: tuple.fold()?,
        })
    }
}

impl EvaluationReport {
    /// Creates an empty report.
    pub fn new(provenance: RunProvenance) -> Self {
        Self {
            provenance,
            results: BTreeMap::new(),
        }
    }

    /// Stores the scores of one Evaluate artifact.
    pub fn insert(&mut self, at: &Coordinates, scores: BatchScores) {
        self.results
            .entry(at.dataset.clone())
            .or_default()
            .entry(at.prune.clone())
            .or_default()
            .entry(at.split.clone())
            .or_default()
            .entry(at.model.clone())
            .or_default()
            .entry(at.seed_mode.clone())
            .or_default()
            .entry(at.shuffle_seed)
            .or_default()
            .insert(at.fold, scores);
    }

    /// Number of Evaluate artifacts aggregated.
    pub fn len(&self) -> usize {
        self.results
            .values()
            .flat_map(|prunes| prunes.values())
            .flat_map(|splits| splits.values())
            .flat_map(|models| models.values())
            .flat_map(|modes| modes.values())
            .map(|shuffles| shuffles.values().map(|folds| folds.len()).sum::<usize>())
            .sum()
    }

    /// Whether the report aggregates nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn in_sweep(config: &ExperimentConfig, tuple: &ParameterTuple) -> bool {
    let listed = |values: Vec<String>, dim: Dimension| {
        tuple
            .text(dim)
            .map(|value| values.iter().any(|v| v == value))
            .unwrap_or(false)
    };
    listed(config.datasets.clone(), Dimension::Dataset)
        && listed(
            config.prune_techniques.iter().map(|p| p.to_string()).collect(),
            Dimension::PruneTechnique,
        )
        && listed(config.split_techniques.clone(), Dimension::SplitTechnique)
        && listed(
            config.models.iter().map(|m| m.to_string()).collect(),
            Dimension::ModelName,
        )
        && listed(
            config.seed_modes.iter().map(|m| m.to_string()).collect(),
            Dimension::SeedMode,
        )
        && tuple.number(Dimension::BatchCount) == Some(u64::from(config.num_batches))
        && tuple.cutoffs(Dimension::TopnCutoffs) == Some(config.topn_scores.as_slice())
}

/// Aggregates every Evaluate artifact of the configured sweep found under `root`.
pub fn build_report(config: &ExperimentConfig, root: &Path) -> Result<EvaluationReport, RseError> {
    let provenance = RunProvenance::new(
        config_hash(config)?,
        config.reproducibility,
        Utc::now().to_rfc3339(),
    );
    let mut report = EvaluationReport::new(provenance);
    let walker = WalkDir::new(root)
        .min_depth(3)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));
    for entry in walker {
        let entry = entry.map_err(|err| io_error("walk", root, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let tuple = match decode_relative(relative, Stage::Evaluate) {
            Ok(tuple) => tuple,
            Err(err) => {
                debug!(path = %relative.display(), error = %err, "not an evaluation artifact");
                continue;
            }
        };
        if !in_sweep(config, &tuple) {
            debug!(path = %relative.display(), "evaluation outside the configured sweep");
            continue;
        }
        let Some(at) = Coordinates::from_tuple(&tuple) else {
            continue;
        };
        let bytes = fs::read(entry.path()).map_err(|err| io_error("read", entry.path(), err))?;
        let scores: BatchScores = from_json_slice(&bytes).map_err(|err| match err {
            RseError::Serde(info) => {
                RseError::Serde(info.with_context("path", entry.path().display().to_string()))
            }
            other => other,
        })?;
        report.insert(&at, scores);
    }
    info!(evaluations = report.len(), "built evaluation report");
    Ok(report)
}

/// Reads a report written by the Report stage.
pub fn load_report(path: &Path) -> Result<EvaluationReport, RseError> {
    let bytes = fs::read(path).map_err(|err| io_error("read", path, err))?;
    from_json_slice(&bytes)
}

/// In-process body of the Report stage.
#[derive(Debug)]
pub struct ReportBody<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> ReportBody<'a> {
    /// Creates the body for `config`.
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }
}

impl StageBody for ReportBody<'_> {
    fn run(&self, invocation: &BodyInvocation<'_>) -> Result<(), RseError> {
        let report = build_report(self.config, invocation.data_root)?;
        let bytes = to_canonical_json_pretty(&report)?;
        for name in invocation.outputs {
            let path = invocation.output_dir.join(name);
            fs::write(&path, &bytes).map_err(|err| io_error("write", &path, err))?;
        }
        Ok(())
    }
}
