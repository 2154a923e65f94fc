//! Plot tables: seed sensitivity of each metric relative to its group's min, max and mean.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use rse_core::config::ExperimentConfig;
use rse_core::errors::{ErrorInfo, RseError};
use rse_core::provenance::RunProvenance;
use rse_core::Stage;
use rse_exp::{config_hash, encode, to_canonical_json_pretty, write_atomic, ParameterTuple};

use crate::body::{BodyInvocation, StageBody};
use crate::report::{load_report, EvaluationReport, FoldScores, Scores};

/// File holding the per-table spread summary, relative to the store root.
pub const SUMMARY_PATH: &str = "plots/summary.json";

fn wrap_csv(code: &str, err: csv::Error) -> RseError {
    RseError::Serde(ErrorInfo::new(code, "CSV plot table failure").with_hint(err.to_string()))
}

/// Validation scheme a row was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Validation {
    /// Highest-index fold only.
    #[serde(rename = "holdout")]
    Holdout,
    /// Mean over all folds.
    #[serde(rename = "cross-validation")]
    CrossValidation,
}

/// Error metric of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    /// Mean absolute error.
    #[serde(rename = "MAE")]
    Mae,
    /// Root mean squared error.
    #[serde(rename = "RMSE")]
    Rmse,
}

impl Metric {
    fn pick(self, scores: &Scores) -> f64 {
        match self {
            Metric::Mae => scores.mae,
            Metric::Rmse => scores.rmse,
        }
    }
}

/// One row of a plot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRow {
    /// Dataset the row was computed on.
    pub dataset: String,
    /// Seed mode of the fit.
    pub training_seed: String,
    /// Shuffle seed of the split.
    pub shuffle_seed: u64,
    /// Top-N cutoff.
    pub k: u32,
    /// Validation scheme.
    pub validation: Validation,
    /// Metric.
    pub metric: Metric,
    /// Raw metric value.
    pub value: f64,
    /// `(value / min - 1) * 100` within the row's group.
    pub relative_min: f64,
    /// `value / max` within the row's group.
    pub relative_max: f64,
    /// `value / mean * 100` within the row's group.
    pub relative_mean: f64,
    /// `|100 - value / mean * 100|` within the row's group.
    pub absolute_mean: f64,
}

/// Identifies one plot table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableId {
    /// Model name.
    pub model: String,
    /// Pruning technique.
    pub prune: String,
    /// Split technique.
    pub split: String,
}

impl TableId {
    fn label(&self) -> String {
        format!("{}/{}/{}", self.model, self.prune, self.split)
    }
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn ratio(value: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        value / denominator
    }
}

/// Mean over batches of one fold's scores at cutoff `k`.
fn fold_mean(folds: &FoldScores, fold: u32, k: u32, metric: Metric) -> Option<f64> {
    let batches = folds.get(&fold)?;
    mean(
        batches
            .values()
            .filter_map(|cutoffs| cutoffs.get(&k))
            .map(|scores| metric.pick(scores)),
    )
}

fn rows_for_shuffle(
    dataset: &str,
    seed_mode: &str,
    shuffle_seed: u64,
    folds: &FoldScores,
    cutoffs: &[u32],
    rows: &mut Vec<PlotRow>,
) {
    let Some(holdout_fold) = folds.keys().next_back().copied() else {
        return;
    };
    for k in cutoffs {
        for metric in [Metric::Mae, Metric::Rmse] {
            let Some(holdout) = fold_mean(folds, holdout_fold, *k, metric) else {
                continue;
            };
            let cv = mean(folds.keys().filter_map(|fold| fold_mean(folds, *fold, *k, metric)));
            let values = [
                (Validation::Holdout, Some(holdout)),
                (Validation::CrossValidation, cv),
            ];
            for (validation, value) in values {
                if let Some(value) = value {
                    rows.push(PlotRow {
                        dataset: dataset.to_string(),
                        training_seed: seed_mode.to_string(),
                        shuffle_seed,
                        k: *k,
                        validation,
                        metric,
                        value,
                        relative_min: 0.0,
                        relative_max: 0.0,
                        relative_mean: 0.0,
                        absolute_mean: 0.0,
                    });
                }
            }
        }
    }
}

/// Fills the relative columns per `(training seed, k, validation, metric)` group.
fn normalize(rows: &mut [PlotRow]) {
    let mut groups: BTreeMap<(String, u32, Validation, Metric), Vec<usize>> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        groups
            .entry((row.training_seed.clone(), row.k, row.validation, row.metric))
            .or_default()
            .push(idx);
    }
    for members in groups.values() {
        let values: Vec<f64> = members.iter().map(|idx| rows[*idx].value).collect();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = mean(values.iter().copied()).unwrap_or(f64::NAN);
        for idx in members {
            let row = &mut rows[*idx];
            row.relative_min = (ratio(row.value, min) - 1.0) * 100.0;
            row.relative_max = ratio(row.value, max);
            row.relative_mean = ratio(row.value, avg) * 100.0;
            row.absolute_mean = (100.0 - row.relative_mean).abs();
        }
    }
}

/// Builds every plot table from the report.
///
/// Rows are normalized per dataset and then concatenated across datasets.
pub fn build_tables(report: &EvaluationReport, cutoffs: &[u32]) -> BTreeMap<TableId, Vec<PlotRow>> {
    let mut tables: BTreeMap<TableId, Vec<PlotRow>> = BTreeMap::new();
    for (dataset, prunes) in &report.results {
        for (prune, splits) in prunes {
            for (split, models) in splits {
                for (model, modes) in models {
                    let mut rows = Vec::new();
                    for (mode, shuffles) in modes {
                        for (shuffle, folds) in shuffles {
                            rows_for_shuffle(dataset, mode, *shuffle, folds, cutoffs, &mut rows);
                        }
                    }
                    normalize(&mut rows);
                    let id = TableId {
                        model: model.clone(),
                        prune: prune.clone(),
                        split: split.clone(),
                    };
                    tables.entry(id).or_default().extend(rows);
                }
            }
        }
    }
    tables
}

/// Writes one table as CSV.
pub fn write_table(path: &Path, rows: &[PlotRow]) -> Result<(), RseError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|err| wrap_csv("plot.open", err))?;
    if rows.is_empty() {
        wtr.write_record([
            "dataset",
            "training_seed",
            "shuffle_seed",
            "k",
            "validation",
            "metric",
            "value",
            "relative_min",
            "relative_max",
            "relative_mean",
            "absolute_mean",
        ])
        .map_err(|err| wrap_csv("plot.header", err))?;
    }
    for row in rows {
        wtr.serialize(row).map_err(|err| wrap_csv("plot.row", err))?;
    }
    wtr.flush()
        .map_err(|err| RseError::Io(ErrorInfo::new("plot.flush", err.to_string())))
}

/// Spread of one table: the largest relative-to-minimum value per validation scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    /// Number of rows in the table.
    pub rows: usize,
    /// Largest holdout `relative_min`.
    pub holdout_max_relative_min: Option<f64>,
    /// Largest cross-validation `relative_min`.
    pub cv_max_relative_min: Option<f64>,
}

/// Content of `plots/summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSummary {
    /// How and when the summary was produced.
    pub provenance: RunProvenance,
    /// Summary per `model/prune/split`.
    pub tables: BTreeMap<String, TableSummary>,
}

fn max_relative_min(rows: &[PlotRow], validation: Validation) -> Option<f64> {
    rows.iter()
        .filter(|row| row.validation == validation && row.relative_min.is_finite())
        .map(|row| row.relative_min)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

/// Summarizes every table.
pub fn summarize(
    config: &ExperimentConfig,
    tables: &BTreeMap<TableId, Vec<PlotRow>>,
) -> Result<PlotSummary, RseError> {
    let provenance = RunProvenance::new(
        config_hash(config)?,
        config.reproducibility,
        Utc::now().to_rfc3339(),
    );
    let tables = tables
        .iter()
        .map(|(id, rows)| {
            (
                id.label(),
                TableSummary {
                    rows: rows.len(),
                    holdout_max_relative_min: max_relative_min(rows, Validation::Holdout),
                    cv_max_relative_min: max_relative_min(rows, Validation::CrossValidation),
                },
            )
        })
        .collect();
    Ok(PlotSummary { provenance, tables })
}

fn report_path(root: &Path) -> Result<std::path::PathBuf, RseError> {
    Ok(root.join(encode(&ParameterTuple::new(), Stage::Report)?.relative_path()))
}

/// Rewrites `plots/summary.json` from the current report.
pub fn write_summary(config: &ExperimentConfig, root: &Path) -> Result<PlotSummary, RseError> {
    let report = load_report(&report_path(root)?)?;
    let tables = build_tables(&report, &config.plot_topn);
    let summary = summarize(config, &tables)?;
    write_atomic(&root.join(SUMMARY_PATH), &to_canonical_json_pretty(&summary)?)?;
    info!(tables = summary.tables.len(), "wrote plot summary");
    Ok(summary)
}

/// In-process body of the Plot stage: one table per `(model, prune, split)` unit.
#[derive(Debug)]
pub struct PlotBody<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> PlotBody<'a> {
    /// Creates the body for `config`.
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }
}

impl StageBody for PlotBody<'_> {
    fn run(&self, invocation: &BodyInvocation<'_>) -> Result<(), RseError> {
        let report = load_report(&report_path(invocation.data_root)?)?;
        let id = TableId {
            model: invocation
                .tuple
                .model()
                .map(|m| m.to_string())
                .unwrap_or_default(),
            prune: invocation
                .tuple
                .prune()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            split: invocation.tuple.split().unwrap_or_default().to_string(),
        };
        let tables = build_tables(&report, &self.config.plot_topn);
        let rows = tables.get(&id).filter(|rows| !rows.is_empty()).ok_or_else(|| {
            RseError::Stage(
                ErrorInfo::new("no-evaluations", "the report holds no results for this table")
                    .with_context("table", id.label()),
            )
        })?;
        for name in invocation.outputs {
            write_table(&invocation.output_dir.join(name), rows)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_uses_group_extremes() {
        let mut rows: Vec<PlotRow> = [2.0, 4.0]
            .iter()
            .enumerate()
            .map(|(idx, value)| PlotRow {
                dataset: "A".into(),
                training_seed: "random".into(),
                shuffle_seed: idx as u64,
                k: 1,
                validation: Validation::Holdout,
                metric: Metric::Mae,
                value: *value,
                relative_min: 0.0,
                relative_max: 0.0,
                relative_mean: 0.0,
                absolute_mean: 0.0,
            })
            .collect();
        normalize(&mut rows);
        assert_eq!(rows[0].relative_min, 0.0);
        assert_eq!(rows[1].relative_min, 100.0);
        assert_eq!(rows[0].relative_max, 0.5);
        assert!((rows[1].relative_mean - 400.0 / 3.0).abs() < 1e-9);
        assert!((rows[0].absolute_mean - (100.0 - 200.0 / 3.0)).abs() < 1e-9);
    }
}
