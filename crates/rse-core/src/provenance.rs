//! Provenance descriptors attached to aggregated artifacts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic version describing the schema of serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for fixes.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Provenance recorded in the evaluation report and plot summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Schema of the artifact carrying this record.
    pub schema: SchemaVersion,
    /// Hash of the canonical experiment configuration.
    pub config_hash: String,
    /// Whether seeds were replayed from the seed book.
    pub reproducibility: bool,
    /// RFC 3339 timestamp of when the artifact was produced.
    pub created_at: String,
    /// Version map for all tools involved in the run.
    pub tool_versions: BTreeMap<String, String>,
}

impl RunProvenance {
    /// Creates a record for the current build of the pipeline.
    pub fn new(config_hash: impl Into<String>, reproducibility: bool, created_at: impl Into<String>) -> Self {
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert("rse".to_string(), env!("CARGO_PKG_VERSION").to_string());
        Self {
            schema: SchemaVersion::default(),
            config_hash: config_hash.into(),
            reproducibility,
            created_at: created_at.into(),
            tool_versions,
        }
    }
}
