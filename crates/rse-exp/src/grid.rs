//! Parameter grid expansion per stage.
//!
//! Tuples come out in the nested order dataset, prune, split, model, shuffle
//! seed, seed mode, fold, batch. Each tuple binds exactly the dimensions of
//! the stage key schema, in schema order.

use std::collections::BTreeSet;

use rse_core::config::{ExperimentConfig, PruneTechnique};
use rse_core::errors::RseError;
use rse_core::rng::RngHandle;
use rse_core::Stage;
use tracing::warn;

use crate::key::{schema, Dimension, FieldValue, ParameterTuple};
use crate::seeds::SeedBook;

/// Discovers which shuffle seeds already have split artifacts.
pub trait ShuffleSeedSource {
    /// Distinct shuffle seeds recorded for `(dataset, prune, split)`, ascending.
    fn shuffle_seeds(
        &self,
        dataset: &str,
        prune: PruneTechnique,
        split: &str,
    ) -> Result<BTreeSet<u64>, RseError>;
}

/// How Split obtains its shuffle seeds.
#[derive(Debug)]
pub enum SplitSeeds<'a> {
    /// One fresh draw per `(dataset, prune, split)`.
    Fresh(&'a mut RngHandle),
    /// Every shuffle seed the seed book records for the dataset.
    Recorded(&'a SeedBook),
}

/// Values bound while walking the nested loops.
#[derive(Debug, Clone, Default)]
struct Binding {
    values: Vec<(Dimension, FieldValue)>,
}

impl Binding {
    fn bind(&self, dim: Dimension, value: impl Into<FieldValue>) -> Binding {
        let mut next = self.clone();
        next.values.push((dim, value.into()));
        next
    }

    fn tuple_for(&self, stage: Stage) -> ParameterTuple {
        let mut tuple = ParameterTuple::new();
        for dim in schema(stage).dimensions() {
            if let Some((_, value)) = self.values.iter().find(|(bound, _)| *bound == dim) {
                tuple.set(dim, value.clone());
            }
        }
        tuple
    }
}

/// Expands the grid of `stage` into its parameter tuples.
///
/// Fit, Predict and Evaluate discover shuffle seeds through `source`. Split
/// draws or replays them through `split_seeds`.
pub fn expand(
    config: &ExperimentConfig,
    stage: Stage,
    source: &dyn ShuffleSeedSource,
    split_seeds: &mut SplitSeeds<'_>,
) -> Result<Vec<ParameterTuple>, RseError> {
    let mut out = Vec::new();
    match stage {
        Stage::Report => out.push(ParameterTuple::new()),
        Stage::Plot => {
            for prune in &config.prune_techniques {
                for split in &config.split_techniques {
                    for model in &config.models {
                        let binding = Binding::default()
                            .bind(Dimension::PruneTechnique, *prune)
                            .bind(Dimension::SplitTechnique, split.as_str())
                            .bind(Dimension::ModelName, *model);
                        out.push(binding.tuple_for(stage));
                    }
                }
            }
        }
        _ => {
            for dataset in &config.datasets {
                let base = Binding::default().bind(Dimension::Dataset, dataset.as_str());
                if stage == Stage::Clean {
                    out.push(base.tuple_for(stage));
                    continue;
                }
                for prune in &config.prune_techniques {
                    let pruned = base.bind(Dimension::PruneTechnique, *prune);
                    if stage == Stage::Prune {
                        out.push(pruned.tuple_for(stage));
                        continue;
                    }
                    for split in &config.split_techniques {
                        let binding = pruned.bind(Dimension::SplitTechnique, split.as_str());
                        if stage == Stage::Split {
                            for seed in split_shuffle_seeds(dataset, split_seeds)? {
                                let seeded = binding.bind(Dimension::ShuffleSeed, seed);
                                for fold in config.folds() {
                                    out.push(seeded.bind(Dimension::FoldIndex, fold).tuple_for(stage));
                                }
                            }
                            continue;
                        }
                        let shuffles = source.shuffle_seeds(dataset, *prune, split)?;
                        expand_models(config, stage, &binding, &shuffles, &mut out);
                    }
                }
            }
        }
    }
    Ok(out)
}

fn split_shuffle_seeds(dataset: &str, split_seeds: &mut SplitSeeds<'_>) -> Result<Vec<u64>, RseError> {
    match split_seeds {
        SplitSeeds::Fresh(rng) => Ok(vec![rng.draw_seed()]),
        SplitSeeds::Recorded(book) => {
            let seeds = book.shuffle_seeds(dataset);
            if seeds.is_empty() {
                warn!(dataset, "seed book records no shuffle seeds for dataset");
            }
            Ok(seeds)
        }
    }
}

fn expand_models(
    config: &ExperimentConfig,
    stage: Stage,
    binding: &Binding,
    shuffles: &BTreeSet<u64>,
    out: &mut Vec<ParameterTuple>,
) {
    for model in &config.models {
        let modelled = binding.bind(Dimension::ModelName, *model);
        for shuffle in shuffles {
            let shuffled = modelled.bind(Dimension::ShuffleSeed, *shuffle);
            for mode in &config.seed_modes {
                let moded = shuffled.bind(Dimension::SeedMode, *mode);
                for fold in config.folds() {
                    let folded = moded.bind(Dimension::FoldIndex, fold);
                    match stage {
                        Stage::Predict => {
                            let counted = folded.bind(Dimension::BatchCount, config.num_batches);
                            for batch in config.batches() {
                                out.push(counted.bind(Dimension::BatchIndex, batch).tuple_for(stage));
                            }
                        }
                        Stage::Evaluate => out.push(
                            folded
                                .bind(Dimension::BatchCount, config.num_batches)
                                .bind(Dimension::TopnCutoffs, config.topn_scores.clone())
                                .tuple_for(stage),
                        ),
                        _ => out.push(folded.tuple_for(stage)),
                    }
                }
            }
        }
    }
}

/// Exact number of tuples [`expand`] yields for `stage` when every
/// `(dataset, prune, split)` combination has `seeds_per_combination` shuffle seeds.
pub fn grid_size(config: &ExperimentConfig, stage: Stage, seeds_per_combination: u64) -> u64 {
    let datasets = config.datasets.len() as u64;
    let prunes = config.prune_techniques.len() as u64;
    let splits = config.split_techniques.len() as u64;
    let models = config.models.len() as u64;
    let modes = config.seed_modes.len() as u64;
    let folds = u64::from(config.num_folds);
    let batches = u64::from(config.num_batches);
    let combos = datasets * prunes * splits;
    let fits = combos * models * seeds_per_combination * modes * folds;
    match stage {
        Stage::Clean => datasets,
        Stage::Prune => datasets * prunes,
        Stage::Split => combos * seeds_per_combination * folds,
        Stage::Fit | Stage::Evaluate => fits,
        Stage::Predict => fits * batches,
        Stage::Report => 1,
        Stage::Plot => prunes * splits * models,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    struct FixedSeeds(BTreeMap<(String, PruneTechnique, String), BTreeSet<u64>>);

    impl ShuffleSeedSource for FixedSeeds {
        fn shuffle_seeds(
            &self,
            dataset: &str,
            prune: PruneTechnique,
            split: &str,
        ) -> Result<BTreeSet<u64>, RseError> {
            Ok(self
                .0
                .get(&(dataset.to_string(), prune, split.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn config() -> ExperimentConfig {
        let text = r#"{
            "DATA_SET_NAMES": ["A"],
            "PRUNE_TECHNIQUES": ["none"],
            "SPLIT_TECHNIQUES": ["random"],
            "NUM_FOLDS": 2,
            "MLMODELS": ["knn"],
            "ML_SEEDING": ["random"],
            "REPRODUCIBILITY_MODE": false,
            "NUM_BATCHES": 2,
            "TOPN_SCORES": [1, 5]
        }"#;
        ExperimentConfig::from_json_str(text, Path::new("/tmp")).unwrap()
    }

    #[test]
    fn predict_tuples_follow_loop_order() {
        let cfg = config();
        let mut seeds = BTreeMap::new();
        seeds.insert(
            ("A".to_string(), PruneTechnique::None, "random".to_string()),
            BTreeSet::from([9, 3]),
        );
        let source = FixedSeeds(seeds);
        let mut rng = RngHandle::from_seed(1);
        let tuples = expand(&cfg, Stage::Predict, &source, &mut SplitSeeds::Fresh(&mut rng)).unwrap();
        assert_eq!(tuples.len() as u64, grid_size(&cfg, Stage::Predict, 2));
        let order: Vec<(u64, u32, u64)> = tuples
            .iter()
            .map(|t| {
                (
                    t.shuffle_seed().unwrap(),
                    t.fold().unwrap(),
                    t.number(Dimension::BatchIndex).unwrap(),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![
                (3, 0, 0),
                (3, 0, 1),
                (3, 1, 0),
                (3, 1, 1),
                (9, 0, 0),
                (9, 0, 1),
                (9, 1, 0),
                (9, 1, 1)
            ]
        );
        assert_eq!(tuples[0].dimensions(), schema(Stage::Predict).dimensions());
    }

    #[test]
    fn missing_split_artifacts_expand_to_nothing() {
        let cfg = config();
        let source = FixedSeeds(BTreeMap::new());
        let mut rng = RngHandle::from_seed(1);
        let tuples = expand(&cfg, Stage::Fit, &source, &mut SplitSeeds::Fresh(&mut rng)).unwrap();
        assert!(tuples.is_empty());
    }
}
