use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{harvest::HarvestArgs, plan::PlanArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(name = "rse", about = "Random seed effects pipeline orchestrator")]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every unit of one stage, skipping the ones already complete.
    Run(RunArgs),
    /// List the units of one stage and their output keys without running them.
    Plan(PlanArgs),
    /// Collect model seeds from fitted artifacts into the seed book.
    HarvestSeeds(HarvestArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    match &cli.command {
        Command::Run(args) => commands::run::run(args),
        Command::Plan(args) => commands::plan::run(args),
        Command::HarvestSeeds(args) => commands::harvest::run(args),
    }
}
