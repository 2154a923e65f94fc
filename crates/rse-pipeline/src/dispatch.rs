//! Runs every unit of one stage and tallies the outcomes.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rse_core::config::ExperimentConfig;
use rse_core::errors::{ErrorInfo, RseError};
use rse_core::rng::RngHandle;
use rse_core::Stage;
use rse_exp::{ArtifactStore, SeedBook};

use crate::body::StageBody;
use crate::plot::{write_summary, PlotBody};
use crate::report::ReportBody;
use crate::runner::{run_unit, UnitOutcome};
use crate::units::{plan_units, SeedPolicy, WorkUnit};

/// Options governing a stage run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Number of units executed in parallel.
    pub jobs: usize,
    /// Master seed for fresh draws; operating system entropy when absent.
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { jobs: 1, seed: None }
    }
}

/// A unit that did not produce its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    /// Unit label.
    pub unit: String,
    /// Rendered error.
    pub reason: String,
}

/// Tally of one stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage that ran.
    pub stage: Stage,
    /// Number of units planned.
    pub planned: usize,
    /// Units whose body ran successfully.
    pub executed: usize,
    /// Units whose outputs already existed.
    pub skipped: usize,
    /// Units whose inputs were missing.
    pub blocked: usize,
    /// Units whose replayed seed was not recorded.
    pub seed_missing: usize,
    /// Units that failed.
    pub failures: Vec<UnitFailure>,
}

impl StageReport {
    fn new(stage: Stage, planned: usize) -> Self {
        Self {
            stage,
            planned,
            executed: 0,
            skipped: 0,
            blocked: 0,
            seed_missing: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, unit: &WorkUnit, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Skipped => self.skipped += 1,
            UnitOutcome::Executed => self.executed += 1,
            UnitOutcome::Blocked(_) => self.blocked += 1,
            UnitOutcome::SeedMissing(_) => self.seed_missing += 1,
            UnitOutcome::Failed(reason) => self.failures.push(UnitFailure {
                unit: unit.label(),
                reason,
            }),
        }
    }

    /// Whether any unit failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

fn uses_seed_book(config: &ExperimentConfig, stage: Stage) -> bool {
    config.reproducibility && matches!(stage, Stage::Split | Stage::Fit)
}

/// Plans the units of `stage` without running anything.
pub fn plan(
    config: &ExperimentConfig,
    stage: Stage,
    opts: &RunOptions,
) -> Result<Vec<WorkUnit>, RseError> {
    let store = ArtifactStore::new(&config.data_root);
    let book = if uses_seed_book(config, stage) {
        Some(SeedBook::load(&config.seed_book)?)
    } else {
        None
    };
    let mut rng = opts
        .seed
        .map(RngHandle::from_seed)
        .unwrap_or_else(RngHandle::from_entropy);
    plan_units(
        config,
        stage,
        &store,
        SeedPolicy {
            rng: &mut rng,
            book: book.as_ref(),
        },
    )
}

/// Runs every unit of `stage`.
///
/// External stages use `external`; Report and Plot always run in process.
pub fn dispatch(
    config: &ExperimentConfig,
    stage: Stage,
    external: &dyn StageBody,
    opts: &RunOptions,
) -> Result<StageReport, RseError> {
    let units = plan(config, stage, opts)?;
    let store = ArtifactStore::new(&config.data_root);
    let report_body = ReportBody::new(config);
    let plot_body = PlotBody::new(config);
    let body: &dyn StageBody = match stage {
        Stage::Report => &report_body,
        Stage::Plot => &plot_body,
        _ => external,
    };
    info!(stage = %stage, units = units.len(), jobs = opts.jobs, "dispatching stage");

    let outcomes = if opts.jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opts.jobs)
            .build()
            .map_err(|err| RseError::Io(ErrorInfo::new("thread_pool", err.to_string())))?;
        let mut ordered: Vec<(usize, UnitOutcome)> = pool.install(|| {
            units
                .par_iter()
                .enumerate()
                .map(|(index, unit)| (index, run_unit(&store, unit, body)))
                .collect()
        });
        ordered.sort_by_key(|(index, _)| *index);
        ordered.into_iter().map(|(_, outcome)| outcome).collect()
    } else {
        units
            .iter()
            .map(|unit| run_unit(&store, unit, body))
            .collect::<Vec<_>>()
    };

    let mut report = StageReport::new(stage, units.len());
    for (unit, outcome) in units.iter().zip(outcomes) {
        report.record(unit, outcome);
    }

    if stage == Stage::Plot && report.executed > 0 {
        write_summary(config, store.root())?;
    }
    if report.has_failures() {
        warn!(stage = %stage, failed = report.failures.len(), "stage finished with failures");
    }
    info!(
        stage = %stage,
        executed = report.executed,
        skipped = report.skipped,
        blocked = report.blocked,
        seed_missing = report.seed_missing,
        failed = report.failures.len(),
        "stage finished"
    );
    Ok(report)
}

/// Resolves a numeric stage selector and dispatches it.
///
/// An index outside `0..=7` is rejected before anything touches the store.
pub fn dispatch_index(
    config: &ExperimentConfig,
    index: i64,
    external: &dyn StageBody,
    opts: &RunOptions,
) -> Result<StageReport, RseError> {
    let stage = Stage::from_index(index)?;
    dispatch(config, stage, external, opts)
}
