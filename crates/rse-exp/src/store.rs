//! Filesystem artifact store addressed by [`ArtifactKey`]s.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rse_core::config::PruneTechnique;
use rse_core::errors::{ErrorInfo, RseError};
use rse_core::Stage;
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::grid::ShuffleSeedSource;
use crate::key::{decode_file_name_with, schema, ArtifactKey, Dimension, ParameterTuple};

fn io_error(code: &str, path: &Path, err: impl ToString) -> RseError {
    RseError::Io(ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()))
}

/// Result of publishing a staged file with create-if-absent semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publication {
    /// The staged file now lives at the destination.
    Created,
    /// Another writer published the destination first; the staged copy was dropped.
    AlreadyPresent,
}

/// One artifact found while scanning a stage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedArtifact {
    /// Directory dimensions of the scan followed by the decoded file dimensions.
    pub tuple: ParameterTuple,
    /// Absolute path of the file.
    pub path: PathBuf,
}

/// Artifact store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens a store at `root`. Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the primary artifact for `key`.
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Absolute path of a side-channel file for `key`.
    pub fn side_channel_for(&self, key: &ArtifactKey, suffix: &str) -> PathBuf {
        self.root.join(key.side_channel_path(suffix))
    }

    /// Whether the primary artifact for `key` exists.
    pub fn exists(&self, key: &ArtifactKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Lists primary artifacts of `stage` in the directory selected by `directory`.
    pub fn scan(
        &self,
        stage: Stage,
        directory: &ParameterTuple,
    ) -> Result<Vec<ScannedArtifact>, RseError> {
        self.scan_with_suffix(stage, directory, schema(stage).suffix)
    }

    /// Lists files ending in `suffix` in the directory of `stage` selected by `directory`.
    ///
    /// Names that do not decode are skipped. Entries come back sorted by file name.
    pub fn scan_with_suffix(
        &self,
        stage: Stage,
        directory: &ParameterTuple,
        suffix: &str,
    ) -> Result<Vec<ScannedArtifact>, RseError> {
        let schema = schema(stage);
        let dir_dims = schema.directory_dimensions();
        let dir_tuple = directory.project(&dir_dims).ok_or_else(|| {
            RseError::Config(
                ErrorInfo::new("missing-dimension", "scan needs every directory dimension")
                    .with_context("stage", stage.name()),
            )
        })?;
        let dir = self.root.join(schema.directory_for(&dir_tuple)?);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error("read_dir", &dir, err)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error("read_dir", &dir, err))?;
            if !entry.file_type().map(|ty| ty.is_file()).unwrap_or(false) {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => debug!(name = ?raw, "skipping non UTF-8 file name"),
            }
        }
        names.sort();

        let mut found = Vec::new();
        for name in names {
            match decode_file_name_with(&name, stage, suffix) {
                Ok(file_tuple) => {
                    let mut tuple = dir_tuple.clone();
                    for (dim, value) in file_tuple.iter() {
                        tuple.set(dim, value.clone());
                    }
                    found.push(ScannedArtifact {
                        tuple,
                        path: dir.join(&name),
                    });
                }
                Err(err) => debug!(stage = %stage, file = %name, error = %err, "skipping file"),
            }
        }
        Ok(found)
    }

    /// Distinct shuffle seeds of every split artifact of `dataset`, ascending.
    pub fn all_shuffle_seeds(&self, dataset: &str) -> Result<BTreeSet<u64>, RseError> {
        let dir = ParameterTuple::new().with(Dimension::Dataset, dataset);
        Ok(self
            .scan(Stage::Split, &dir)?
            .into_iter()
            .filter_map(|artifact| artifact.tuple.shuffle_seed())
            .collect())
    }

    /// Creates a private staging directory inside the store root.
    pub fn staging(&self) -> Result<TempDir, RseError> {
        fs::create_dir_all(&self.root).map_err(|err| io_error("create_dir", &self.root, err))?;
        tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)
            .map_err(|err| io_error("staging", &self.root, err))
    }

    /// Publishes `staged` at `dest` only if nothing is there yet.
    ///
    /// Uses a hard link so the check and the creation are one atomic step.
    pub fn publish(&self, staged: &Path, dest: &Path) -> Result<Publication, RseError> {
        ensure_parent(dest)?;
        match fs::hard_link(staged, dest) {
            Ok(()) => Ok(Publication::Created),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(Publication::AlreadyPresent),
            Err(err) => Err(io_error("publish", dest, err)),
        }
    }

    /// Moves `staged` to `dest`, replacing any previous file atomically.
    pub fn replace(&self, staged: &Path, dest: &Path) -> Result<(), RseError> {
        ensure_parent(dest)?;
        fs::rename(staged, dest).map_err(|err| io_error("rename", dest, err))
    }

    /// Writes `bytes` to `path` through a temporary file in the same directory.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), RseError> {
        write_atomic(path, bytes)
    }
}

fn ensure_parent(path: &Path) -> Result<(), RseError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error("create_dir", parent, err))?;
    }
    Ok(())
}

/// Writes `bytes` to `path` so readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RseError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent).map_err(|err| io_error("create_dir", &parent, err))?;
    let mut tmp = NamedTempFile::new_in(&parent).map_err(|err| io_error("tempfile", &parent, err))?;
    tmp.write_all(bytes).map_err(|err| io_error("write", path, err))?;
    tmp.flush().map_err(|err| io_error("flush", path, err))?;
    tmp.as_file()
        .sync_all()
        .map_err(|err| io_error("sync", path, err))?;
    tmp.persist(path)
        .map_err(|err| io_error("persist", path, err.error))?;
    Ok(())
}

impl ShuffleSeedSource for ArtifactStore {
    fn shuffle_seeds(
        &self,
        dataset: &str,
        prune: PruneTechnique,
        split: &str,
    ) -> Result<BTreeSet<u64>, RseError> {
        let dir = ParameterTuple::new().with(Dimension::Dataset, dataset);
        Ok(self
            .scan(Stage::Split, &dir)?
            .into_iter()
            .filter(|artifact| {
                artifact.tuple.prune() == Some(prune) && artifact.tuple.split() == Some(split)
            })
            .filter_map(|artifact| artifact.tuple.shuffle_seed())
            .collect())
    }
}
