use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use rse_core::load_config;
use rse_exp::to_canonical_json_pretty;
use rse_pipeline::{dispatch, dispatch_index, CommandBody, RunOptions};

use super::{boxed, StageSelector};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON experiment configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// Stage index (0-7) or name.
    #[arg(long, allow_hyphen_values = true)]
    pub stage: String,
    /// Units executed in parallel.
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,
    /// Master seed for fresh shuffle and model seeds; drawn from the OS when omitted.
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let selector = StageSelector::parse(&args.stage).map_err(boxed)?;
    let config = load_config(&args.config).map_err(boxed)?;
    let body = CommandBody::new(config.stage_command.clone());
    let opts = RunOptions {
        jobs: args.jobs.max(1),
        seed: args.seed,
    };
    let report = match selector {
        StageSelector::Index(index) => dispatch_index(&config, index, &body, &opts),
        StageSelector::Named(stage) => dispatch(&config, stage, &body, &opts),
    }
    .map_err(boxed)?;

    let json = to_canonical_json_pretty(&report).map_err(boxed)?;
    print!("{}", String::from_utf8(json)?);
    if report.has_failures() {
        return Err(format!(
            "{} of {} {} units failed",
            report.failures.len(),
            report.planned,
            report.stage
        )
        .into());
    }
    Ok(())
}
