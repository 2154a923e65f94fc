//! Turns grid tuples into units of work with known outputs, inputs and arguments.

use std::path::PathBuf;

use rse_core::config::{ExperimentConfig, SeedMode};
use rse_core::errors::{ErrorInfo, RseError};
use rse_core::rng::{model_seed, RngHandle, SeedRequest};
use rse_core::Stage;
use rse_exp::{
    encode, expand, format_seed_file, ArtifactKey, ArtifactStore, Dimension, ParameterTuple,
    SeedBook, SplitSeeds, SEED_SUFFIX,
};

use crate::body::Arg;

/// Small file the runner writes next to a unit's primary outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideFile {
    /// Path relative to the store root.
    pub path: PathBuf,
    /// Full file contents.
    pub contents: String,
}

/// One invocation of a stage body.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Stage the unit belongs to.
    pub stage: Stage,
    /// Tuple shared by every output; folds are dropped for Split.
    pub tuple: ParameterTuple,
    /// Keys the unit publishes; the unit is complete once all exist.
    pub outputs: Vec<ArtifactKey>,
    /// Side-channel files published before the primary outputs.
    pub side_files: Vec<SideFile>,
    /// Input artifacts, relative to the store root.
    pub requires: Vec<PathBuf>,
    /// Arguments handed to the body.
    pub args: Vec<Arg>,
    /// Set when the unit cannot run because its seed could not be resolved.
    pub unresolved: Option<RseError>,
}

impl WorkUnit {
    fn new(stage: Stage, tuple: ParameterTuple) -> Self {
        Self {
            stage,
            tuple,
            outputs: Vec::new(),
            side_files: Vec::new(),
            requires: Vec::new(),
            args: Vec::new(),
            unresolved: None,
        }
    }

    /// Human readable identifier for logs and reports.
    pub fn label(&self) -> String {
        if self.tuple.is_empty() {
            self.stage.name().to_string()
        } else {
            format!("{} {}", self.stage, self.tuple)
        }
    }
}

/// Where the seeds of a planning pass come from.
pub struct SeedPolicy<'a> {
    /// Draws fresh split and model seeds.
    pub rng: &'a mut RngHandle,
    /// Harvested seeds to replay, in reproducibility mode.
    pub book: Option<&'a SeedBook>,
}

fn missing(what: &str, stage: Stage) -> RseError {
    RseError::Config(
        ErrorInfo::new("incomplete-tuple", format!("{what} is not bound"))
            .with_context("stage", stage.name()),
    )
}

fn key(tuple: &ParameterTuple, stage: Stage) -> Result<ArtifactKey, RseError> {
    encode(tuple, stage)
}

fn clean_input(dataset: &str) -> Result<PathBuf, RseError> {
    Ok(key(&ParameterTuple::new().with(Dimension::Dataset, dataset), Stage::Clean)?.relative_path())
}

fn prune_input(tuple: &ParameterTuple) -> Result<PathBuf, RseError> {
    let projected = tuple
        .project(&[Dimension::Dataset, Dimension::PruneTechnique])
        .ok_or_else(|| missing("dataset or prune technique", Stage::Prune))?;
    Ok(key(&projected, Stage::Prune)?.relative_path())
}

fn split_inputs(config: &ExperimentConfig, tuple: &ParameterTuple) -> Result<Vec<PathBuf>, RseError> {
    let dataset = tuple.dataset().ok_or_else(|| missing("dataset", Stage::Split))?;
    let shuffle = tuple.shuffle_seed().ok_or_else(|| missing("shuffle seed", Stage::Split))?;
    let prune = tuple.prune().ok_or_else(|| missing("prune technique", Stage::Split))?;
    let split = tuple.split().ok_or_else(|| missing("split technique", Stage::Split))?;
    config
        .folds()
        .map(|fold| {
            let split_tuple = ParameterTuple::new()
                .with(Dimension::Dataset, dataset)
                .with(Dimension::FoldIndex, fold)
                .with(Dimension::ShuffleSeed, shuffle)
                .with(Dimension::PruneTechnique, prune)
                .with(Dimension::SplitTechnique, split);
            Ok(key(&split_tuple, Stage::Split)?.relative_path())
        })
        .collect()
}

fn fit_tuple_of(tuple: &ParameterTuple) -> Result<ParameterTuple, RseError> {
    tuple
        .project(&rse_exp::schema(Stage::Fit).dimensions())
        .ok_or_else(|| missing("fit dimensions", Stage::Fit))
}

fn common_args(tuple: &ParameterTuple) -> Vec<Arg> {
    let mut args = Vec::new();
    if let Some(dataset) = tuple.dataset() {
        args.push(Arg::new("data_set_name", dataset));
    }
    if let Some(prune) = tuple.prune() {
        args.push(Arg::new("prune_technique", prune));
    }
    if let Some(split) = tuple.split() {
        args.push(Arg::new("split_technique", split));
    }
    args
}

fn model_args(tuple: &ParameterTuple) -> Vec<Arg> {
    let mut args = Vec::new();
    if let Some(fold) = tuple.fold() {
        args.push(Arg::new("test_fold", fold));
    }
    if let Some(shuffle) = tuple.shuffle_seed() {
        args.push(Arg::new("shuffle_seed", shuffle));
    }
    if let Some(model) = tuple.model() {
        args.push(Arg::new("MLModel", model));
    }
    if let Some(mode) = tuple.seed_mode() {
        args.push(Arg::new("ML_seeding", mode));
    }
    args
}

/// Expands the grid of `stage` and plans one unit per body invocation.
pub fn plan_units(
    config: &ExperimentConfig,
    stage: Stage,
    store: &ArtifactStore,
    seeds: SeedPolicy<'_>,
) -> Result<Vec<WorkUnit>, RseError> {
    let SeedPolicy { rng, book } = seeds;
    let tuples = {
        let mut split_seeds = match book {
            Some(book) => SplitSeeds::Recorded(book),
            None => SplitSeeds::Fresh(&mut *rng),
        };
        expand(config, stage, store, &mut split_seeds)?
    };

    let mut units = Vec::new();
    match stage {
        Stage::Clean => {
            for tuple in tuples {
                let mut unit = WorkUnit::new(stage, tuple.clone());
                unit.outputs.push(key(&tuple, stage)?);
                unit.args = common_args(&tuple);
                units.push(unit);
            }
        }
        Stage::Prune => {
            for tuple in tuples {
                let mut unit = WorkUnit::new(stage, tuple.clone());
                unit.outputs.push(key(&tuple, stage)?);
                let dataset = tuple.dataset().ok_or_else(|| missing("dataset", stage))?;
                unit.requires.push(clean_input(dataset)?);
                unit.args = common_args(&tuple);
                units.push(unit);
            }
        }
        Stage::Split => {
            // Grid tuples are per fold; one body invocation writes every fold.
            let shared = [
                Dimension::Dataset,
                Dimension::ShuffleSeed,
                Dimension::PruneTechnique,
                Dimension::SplitTechnique,
            ];
            for tuple in tuples {
                let unit_tuple = tuple
                    .project(&shared)
                    .ok_or_else(|| missing("split dimensions", stage))?;
                let output = key(&tuple, stage)?;
                match units.last_mut() {
                    Some(unit) if unit_tuple == unit.tuple => unit.outputs.push(output),
                    _ => {
                        let mut unit = WorkUnit::new(stage, unit_tuple.clone());
                        unit.outputs.push(output);
                        unit.requires.push(prune_input(&unit_tuple)?);
                        unit.args = common_args(&unit_tuple);
                        unit.args.push(Arg::new("num_folds", config.num_folds));
                        let shuffle = unit_tuple
                            .shuffle_seed()
                            .ok_or_else(|| missing("shuffle seed", stage))?;
                        unit.args.push(Arg::new("reproducibility_seed", shuffle));
                        units.push(unit);
                    }
                }
            }
        }
        Stage::Fit => {
            for tuple in tuples {
                let output = key(&tuple, stage)?;
                let mut unit = WorkUnit::new(stage, tuple.clone());
                unit.requires = split_inputs(config, &tuple)?;
                unit.args = common_args(&tuple);
                unit.args.push(Arg::new("num_folds", config.num_folds));
                unit.args.extend(model_args(&tuple));
                match fit_seed(&tuple, rng, book) {
                    Ok(seed) => {
                        unit.args.push(Arg::new("reproducibility_seed", seed));
                        unit.side_files.push(SideFile {
                            path: output.side_channel_path(SEED_SUFFIX),
                            contents: format_seed_file(seed),
                        });
                    }
                    Err(err) => unit.unresolved = Some(err),
                }
                unit.outputs.push(output);
                units.push(unit);
            }
        }
        Stage::Predict => {
            for tuple in tuples {
                let mut unit = WorkUnit::new(stage, tuple.clone());
                unit.outputs.push(key(&tuple, stage)?);
                unit.requires.extend(split_inputs(config, &tuple)?);
                unit.requires.push(key(&fit_tuple_of(&tuple)?, Stage::Fit)?.relative_path());
                unit.args = common_args(&tuple);
                unit.args.extend(model_args(&tuple));
                unit.args.push(Arg::new("num_batches", config.num_batches));
                let batch = tuple
                    .number(Dimension::BatchIndex)
                    .ok_or_else(|| missing("batch index", stage))?;
                unit.args.push(Arg::new("run_batch", batch));
                units.push(unit);
            }
        }
        Stage::Evaluate => {
            for tuple in tuples {
                let mut unit = WorkUnit::new(stage, tuple.clone());
                unit.outputs.push(key(&tuple, stage)?);
                unit.requires.extend(split_inputs(config, &tuple)?);
                let fit = fit_tuple_of(&tuple)?;
                for batch in config.batches() {
                    let mut predict = fit.clone();
                    predict.set(Dimension::BatchCount, config.num_batches);
                    predict.set(Dimension::BatchIndex, batch);
                    unit.requires.push(key(&predict, Stage::Predict)?.relative_path());
                }
                unit.args = common_args(&tuple);
                unit.args.extend(model_args(&tuple));
                unit.args.push(Arg::new("num_batches", config.num_batches));
                unit.args.push(Arg::many("topn_scores", &config.topn_scores));
                units.push(unit);
            }
        }
        Stage::Report => {
            for tuple in tuples {
                let mut unit = WorkUnit::new(stage, tuple.clone());
                unit.outputs.push(key(&tuple, stage)?);
                units.push(unit);
            }
        }
        Stage::Plot => {
            let report = key(&ParameterTuple::new(), Stage::Report)?.relative_path();
            for tuple in tuples {
                let mut unit = WorkUnit::new(stage, tuple.clone());
                unit.outputs.push(key(&tuple, stage)?);
                unit.requires.push(report.clone());
                units.push(unit);
            }
        }
    }
    Ok(units)
}

fn fit_seed(
    tuple: &ParameterTuple,
    rng: &mut RngHandle,
    book: Option<&SeedBook>,
) -> Result<u64, RseError> {
    let mode = tuple
        .seed_mode()
        .ok_or_else(|| missing("seed mode", Stage::Fit))?;
    let request = match (mode, book) {
        (SeedMode::Random, Some(book)) => {
            let dataset = tuple.dataset().ok_or_else(|| missing("dataset", Stage::Fit))?;
            let shuffle = tuple
                .shuffle_seed()
                .ok_or_else(|| missing("shuffle seed", Stage::Fit))?;
            let model = tuple.model().ok_or_else(|| missing("model", Stage::Fit))?;
            let fold = tuple.fold().ok_or_else(|| missing("fold", Stage::Fit))?;
            SeedRequest::Replay(book.resolve(dataset, shuffle, model, fold)?)
        }
        _ => SeedRequest::Fresh,
    };
    Ok(model_seed(mode, request, rng))
}
