use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use rse_core::load_config;
use rse_pipeline::{plan, RunOptions};

use super::{boxed, StageSelector};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// JSON experiment configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// Stage index (0-7) or name.
    #[arg(long, allow_hyphen_values = true)]
    pub stage: String,
    /// Master seed for fresh shuffle and model seeds.
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(args: &PlanArgs) -> Result<(), Box<dyn Error>> {
    let stage = StageSelector::parse(&args.stage)
        .and_then(StageSelector::resolve)
        .map_err(boxed)?;
    let config = load_config(&args.config).map_err(boxed)?;
    let opts = RunOptions {
        jobs: 1,
        seed: args.seed,
    };
    let units = plan(&config, stage, &opts).map_err(boxed)?;
    for unit in &units {
        println!("{}", unit.label());
        for key in &unit.outputs {
            println!("  -> {key}");
        }
        if let Some(err) = &unit.unresolved {
            println!("  !! {err}");
        }
    }
    println!("{} units", units.len());
    Ok(())
}
