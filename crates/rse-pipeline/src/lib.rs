//! Stage execution for the random seed effects pipeline.
//!
//! A stage run expands the configured grid into [`WorkUnit`]s, skips units
//! whose outputs already exist, runs the rest through a [`StageBody`] inside
//! a private staging directory and publishes the outputs with an atomic
//! create-if-absent step.

pub mod body;
pub mod dispatch;
pub mod plot;
pub mod report;
pub mod runner;
pub mod units;

pub use body::{Arg, BodyInvocation, CommandBody, StageBody};
pub use dispatch::{dispatch, dispatch_index, plan, RunOptions, StageReport, UnitFailure};
pub use plot::{build_tables, write_summary, PlotBody, PlotRow, PlotSummary, TableId};
pub use report::{build_report, load_report, BatchScores, EvaluationReport, ReportBody, Scores};
pub use runner::{run_unit, UnitOutcome};
pub use units::{plan_units, SeedPolicy, SideFile, WorkUnit};
