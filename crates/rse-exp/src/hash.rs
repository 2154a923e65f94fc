use rse_core::errors::RseError;
use rse_core::ExperimentConfig;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::serde::to_canonical_json_bytes;

/// Computes a stable hexadecimal hash for the provided serializable payload.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, RseError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}

/// Hash of the experiment configuration recorded in report provenance.
///
/// Resolved paths are excluded so moving a project does not change the hash.
pub fn config_hash(config: &ExperimentConfig) -> Result<String, RseError> {
    stable_hash_string(&(
        &config.datasets,
        &config.prune_techniques,
        &config.split_techniques,
        config.num_folds,
        &config.models,
        &config.seed_modes,
        config.reproducibility,
        config.num_batches,
        &config.topn_scores,
        &config.plot_topn,
    ))
}
