//! Memoized execution of a single unit of work.

use std::fs;
use std::path::PathBuf;

use rse_core::errors::{ErrorInfo, RseError};
use rse_exp::{ArtifactStore, Publication};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::body::{BodyInvocation, StageBody};
use crate::units::WorkUnit;

/// What happened to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum UnitOutcome {
    /// Every output already existed; the body was not invoked.
    Skipped,
    /// The body ran and its outputs were published.
    Executed,
    /// The seed needed by the unit was not in the seed book.
    SeedMissing(String),
    /// Required inputs are absent, usually because an upstream unit did not run.
    Blocked(Vec<PathBuf>),
    /// The body failed or did not produce its outputs.
    Failed(String),
}

/// Runs `unit` unless all of its outputs already exist.
///
/// Outputs are staged in a private directory inside the store root and only
/// published once the body succeeded and produced every expected file, so a
/// failed unit never leaves an artifact behind. Report and Plot aggregate the
/// whole store and are rebuilt on every run instead of being skipped.
pub fn run_unit(store: &ArtifactStore, unit: &WorkUnit, body: &dyn StageBody) -> UnitOutcome {
    let label = unit.label();
    let memoized = unit.stage.is_external();
    if memoized && unit.outputs.iter().all(|key| store.exists(key)) {
        debug!(unit = %label, "outputs present, skipping");
        return UnitOutcome::Skipped;
    }
    if let Some(err) = &unit.unresolved {
        warn!(unit = %label, error = %err, "seed unavailable, skipping unit");
        return UnitOutcome::SeedMissing(err.to_string());
    }
    let missing: Vec<PathBuf> = unit
        .requires
        .iter()
        .filter(|path| !store.root().join(path).is_file())
        .cloned()
        .collect();
    if !missing.is_empty() {
        warn!(unit = %label, missing = missing.len(), "inputs missing, unit blocked");
        return UnitOutcome::Blocked(missing);
    }

    match execute(store, unit, body) {
        Ok(()) => {
            debug!(unit = %label, "unit executed");
            UnitOutcome::Executed
        }
        Err(err) => {
            error!(unit = %label, error = %err, "unit failed");
            UnitOutcome::Failed(err.to_string())
        }
    }
}

fn execute(store: &ArtifactStore, unit: &WorkUnit, body: &dyn StageBody) -> Result<(), RseError> {
    let staging = store.staging()?;
    let names: Vec<String> = unit.outputs.iter().map(|key| key.file_name()).collect();
    let invocation = BodyInvocation {
        stage: unit.stage,
        tuple: &unit.tuple,
        args: &unit.args,
        data_root: store.root(),
        output_dir: staging.path(),
        outputs: &names,
    };
    body.run(&invocation)?;

    let missing: Vec<&str> = names
        .iter()
        .filter(|name| !staging.path().join(name).is_file())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(RseError::Stage(
            ErrorInfo::new("missing-output", "stage body did not produce every output")
                .with_context("stage", unit.stage.name())
                .with_context("missing", missing.join(",")),
        ));
    }

    let mut staged_sides = Vec::with_capacity(unit.side_files.len());
    for (idx, side) in unit.side_files.iter().enumerate() {
        let staged = staging.path().join(format!(".side-{idx}"));
        fs::write(&staged, &side.contents).map_err(|err| {
            RseError::Io(
                ErrorInfo::new("side-write", err.to_string())
                    .with_context("path", side.path.display().to_string()),
            )
        })?;
        staged_sides.push((staged, store.root().join(&side.path)));
    }

    if !unit.stage.is_external() {
        for (key, name) in unit.outputs.iter().zip(&names) {
            store.replace(&staging.path().join(name), &store.path_for(key))?;
        }
        return Ok(());
    }

    // Side files belong to whichever run created the primary outputs.
    let mut created = true;
    for (key, name) in unit.outputs.iter().zip(&names) {
        let dest = store.path_for(key);
        if store.publish(&staging.path().join(name), &dest)? == Publication::AlreadyPresent {
            debug!(artifact = %key, "artifact published concurrently, keeping existing copy");
            created = false;
        }
    }
    if created {
        for (staged, dest) in &staged_sides {
            store.replace(staged, dest)?;
        }
    }
    Ok(())
}
