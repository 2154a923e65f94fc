//! Fixed ordering of pipeline stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, RseError};

/// One of the eight pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Label encoding and scaling of the raw dataset.
    Clean,
    /// Optional outlier or duplicate pruning.
    Prune,
    /// Shuffled fold assignment.
    Split,
    /// Model fitting per held out fold.
    Fit,
    /// Batched prediction with a fitted model.
    Predict,
    /// MAE and RMSE per top-N cutoff.
    Evaluate,
    /// Aggregation of every evaluation into one report.
    Report,
    /// Normalized plot tables derived from the report.
    Plot,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 8] = [
        Stage::Clean,
        Stage::Prune,
        Stage::Split,
        Stage::Fit,
        Stage::Predict,
        Stage::Evaluate,
        Stage::Report,
        Stage::Plot,
    ];

    /// Resolves a stage from its numeric index.
    ///
    /// Any value outside `0..=7`, negatives included, is a configuration error.
    pub fn from_index(index: i64) -> Result<Self, RseError> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or_else(|| {
                RseError::Config(
                    ErrorInfo::new("unknown-stage", format!("no stage with index {index}"))
                        .with_context("index", index.to_string())
                        .with_hint("valid stage indices are 0 through 7"),
                )
            })
    }

    /// Position of the stage in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Lowercase stage name used on the command line and in logs.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Clean => "clean",
            Stage::Prune => "prune",
            Stage::Split => "split",
            Stage::Fit => "fit",
            Stage::Predict => "predict",
            Stage::Evaluate => "evaluate",
            Stage::Report => "report",
            Stage::Plot => "plot",
        }
    }

    /// Whether the stage body runs as an external process.
    pub fn is_external(self) -> bool {
        !matches!(self, Stage::Report | Stage::Plot)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = RseError;

    /// Accepts either a stage name (case insensitive) or a decimal index.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(index) = trimmed.parse::<i64>() {
            return Self::from_index(index);
        }
        let lowered = trimmed.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.name() == lowered)
            .ok_or_else(|| {
                RseError::Config(
                    ErrorInfo::new("unknown-stage", format!("no stage named '{trimmed}'"))
                        .with_hint("use one of clean, prune, split, fit, predict, evaluate, report, plot"),
                )
            })
    }
}
