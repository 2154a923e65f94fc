use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use rse_core::load_config;
use rse_exp::{harvest, ArtifactStore};

use super::boxed;

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// JSON experiment configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// Where to write the seed book; defaults to SEED_BOOK from the configuration.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &HarvestArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.config).map_err(boxed)?;
    let store = ArtifactStore::new(&config.data_root);
    let book = harvest(&config, &store).map_err(boxed)?;
    let out = args.out.clone().unwrap_or_else(|| config.seed_book.clone());
    book.store(&out).map_err(boxed)?;
    println!("{} seeds -> {}", book.len(), out.display());
    Ok(())
}
