//! Seed registry: harvest model seeds from fitted artifacts and replay them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rse_core::config::{ExperimentConfig, ModelName, SeedMode};
use rse_core::errors::{ErrorInfo, RseError};
use rse_core::Stage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::key::{Dimension, ParameterTuple, SEED_SUFFIX};
use crate::serde::{from_json_slice, to_canonical_json_pretty};
use crate::store::{write_atomic, ArtifactStore};

type FoldSeeds = BTreeMap<u32, u64>;
type ModelSeeds = BTreeMap<String, FoldSeeds>;
type ShuffleSeeds = BTreeMap<u64, ModelSeeds>;

/// Harvested seeds indexed `dataset → shuffle seed → model → fold`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeedBook {
    entries: BTreeMap<String, ShuffleSeeds>,
}

impl SeedBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a seed unless the key already holds one; returns the kept value.
    pub fn insert(
        &mut self,
        dataset: &str,
        shuffle_seed: u64,
        model: ModelName,
        fold: u32,
        seed: u64,
    ) -> u64 {
        *self
            .entries
            .entry(dataset.to_string())
            .or_default()
            .entry(shuffle_seed)
            .or_default()
            .entry(model.as_str().to_string())
            .or_default()
            .entry(fold)
            .or_insert(seed)
    }

    /// Registers a shuffle seed of `dataset`, with or without any model seeds.
    pub fn record_shuffle(&mut self, dataset: &str, shuffle_seed: u64) {
        self.entries
            .entry(dataset.to_string())
            .or_default()
            .entry(shuffle_seed)
            .or_default();
    }

    /// Looks up the harvested seed for one fit.
    pub fn resolve(
        &self,
        dataset: &str,
        shuffle_seed: u64,
        model: ModelName,
        fold: u32,
    ) -> Result<u64, RseError> {
        self.entries
            .get(dataset)
            .and_then(|shuffles| shuffles.get(&shuffle_seed))
            .and_then(|models| models.get(model.as_str()))
            .and_then(|folds| folds.get(&fold))
            .copied()
            .ok_or_else(|| {
                RseError::SeedNotFound(
                    ErrorInfo::new("seed-not-found", "no harvested seed for this fit")
                        .with_context("dataset", dataset)
                        .with_context("shuffle_seed", shuffle_seed.to_string())
                        .with_context("model", model.as_str())
                        .with_context("fold", fold.to_string())
                        .with_hint("run harvest-seeds after a complete non-replay pass"),
                )
            })
    }

    /// Shuffle seeds recorded for `dataset`, ascending.
    pub fn shuffle_seeds(&self, dataset: &str) -> Vec<u64> {
        self.entries
            .get(dataset)
            .map(|shuffles| shuffles.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of recorded seeds.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|shuffles| shuffles.values())
            .flat_map(|models| models.values())
            .map(|folds| folds.len())
            .sum()
    }

    /// Whether the book records nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads a book written by [`SeedBook::store`].
    ///
    /// A missing file is a configuration error: replay cannot proceed without it.
    pub fn load(path: &Path) -> Result<SeedBook, RseError> {
        let bytes = fs::read(path).map_err(|err| {
            RseError::Config(
                ErrorInfo::new("seed-book-read", err.to_string())
                    .with_context("path", path.display().to_string())
                    .with_hint("run harvest-seeds before enabling REPRODUCIBILITY_MODE"),
            )
        })?;
        from_json_slice(&bytes)
    }

    /// Writes the book atomically as canonical JSON.
    pub fn store(&self, path: &Path) -> Result<(), RseError> {
        let bytes = to_canonical_json_pretty(self)?;
        write_atomic(path, &bytes)
    }
}

/// Collects every random-mode model seed present in the store.
///
/// For each dataset, the shuffle seeds are the ones found in its split
/// directory. Every one of them is recorded, so a replayed Split covers it
/// even when no random-mode fit left a seed; seed files whose shuffle seed is
/// not among them are ignored.
/// When two files map to the same key the first in file name order wins.
pub fn harvest(config: &ExperimentConfig, store: &ArtifactStore) -> Result<SeedBook, RseError> {
    let mut book = SeedBook::new();
    for dataset in &config.datasets {
        let shuffles = store.all_shuffle_seeds(dataset)?;
        if shuffles.is_empty() {
            debug!(dataset = %dataset, "no split artifacts to harvest");
            continue;
        }
        for shuffle in &shuffles {
            book.record_shuffle(dataset, *shuffle);
        }
        for model in &config.models {
            let dir = ParameterTuple::new()
                .with(Dimension::Dataset, dataset.as_str())
                .with(Dimension::ModelName, *model);
            for artifact in store.scan_with_suffix(Stage::Fit, &dir, SEED_SUFFIX)? {
                if artifact.tuple.seed_mode() != Some(SeedMode::Random) {
                    continue;
                }
                let (Some(shuffle), Some(fold)) =
                    (artifact.tuple.shuffle_seed(), artifact.tuple.fold())
                else {
                    continue;
                };
                if !shuffles.contains(&shuffle) {
                    continue;
                }
                let seed = match read_seed_file(&artifact.path) {
                    Ok(seed) => seed,
                    Err(err) => {
                        warn!(path = %artifact.path.display(), error = %err, "unreadable seed file");
                        continue;
                    }
                };
                let kept = book.insert(dataset, shuffle, *model, fold, seed);
                if kept != seed {
                    warn!(
                        dataset = %dataset,
                        shuffle_seed = shuffle,
                        model = %model,
                        fold,
                        kept,
                        ignored = seed,
                        "conflicting harvested seeds"
                    );
                }
            }
        }
    }
    info!(seeds = book.len(), "harvested model seeds");
    Ok(book)
}

/// Reads a seed side-channel file: one line holding a decimal integer.
pub fn read_seed_file(path: &Path) -> Result<u64, RseError> {
    let text = fs::read_to_string(path).map_err(|err| {
        RseError::Io(ErrorInfo::new("seed-read", err.to_string()).with_context("path", path.display().to_string()))
    })?;
    text.trim().parse::<u64>().map_err(|err| {
        RseError::Serde(
            ErrorInfo::new("seed-parse", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })
}

/// Renders a seed the way [`read_seed_file`] expects it.
pub fn format_seed_file(seed: u64) -> String {
    format!("{seed}\n")
}
