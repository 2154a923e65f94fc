//! Artifact keys: the filename encoding shared by every stage.
//!
//! A key is the pair of a directory, chosen by the directory dimensions of a
//! tuple, and a file name made of the file dimensions joined with `_` and
//! followed by the stage suffix. Encoding is total for valid tuples and
//! [`decode_relative`] inverts it exactly.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use rse_core::config::{validate_identifier, ModelName, PruneTechnique, SeedMode, KEY_DELIMITER};
use rse_core::errors::{ErrorInfo, RseError};
use rse_core::Stage;
use serde::{Deserialize, Serialize};

/// Named axis of the experiment grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Dataset identifier.
    Dataset,
    /// Pruning technique.
    PruneTechnique,
    /// Split technique identifier.
    SplitTechnique,
    /// Held out fold index.
    FoldIndex,
    /// Seed used to shuffle rows before splitting.
    ShuffleSeed,
    /// Model family.
    ModelName,
    /// Seeding mode of the fit.
    SeedMode,
    /// Total number of prediction batches.
    BatchCount,
    /// Index of one prediction batch.
    BatchIndex,
    /// Top-N cutoffs evaluated together.
    TopnCutoffs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Number,
    Cutoffs,
}

impl Dimension {
    /// Snake case name used in logs and error context.
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Dataset => "dataset",
            Dimension::PruneTechnique => "prune_technique",
            Dimension::SplitTechnique => "split_technique",
            Dimension::FoldIndex => "fold_index",
            Dimension::ShuffleSeed => "shuffle_seed",
            Dimension::ModelName => "model_name",
            Dimension::SeedMode => "seed_mode",
            Dimension::BatchCount => "batch_count",
            Dimension::BatchIndex => "batch_index",
            Dimension::TopnCutoffs => "topn_cutoffs",
        }
    }

    fn kind(self) -> ValueKind {
        match self {
            Dimension::Dataset
            | Dimension::PruneTechnique
            | Dimension::SplitTechnique
            | Dimension::ModelName
            | Dimension::SeedMode => ValueKind::Text,
            Dimension::FoldIndex
            | Dimension::ShuffleSeed
            | Dimension::BatchCount
            | Dimension::BatchIndex => ValueKind::Number,
            Dimension::TopnCutoffs => ValueKind::Cutoffs,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value bound to one [`Dimension`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Identifier such as a dataset or model name.
    Text(String),
    /// Non-negative integer such as a fold or seed.
    Number(u64),
    /// Ordered list of top-N cutoffs.
    Cutoffs(Vec<u32>),
}

impl FieldValue {
    fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Text(_) => ValueKind::Text,
            FieldValue::Number(_) => ValueKind::Number,
            FieldValue::Cutoffs(_) => ValueKind::Cutoffs,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Number(number) => write!(f, "{number}"),
            FieldValue::Cutoffs(cutoffs) => f.write_str(&encode_cutoffs(cutoffs)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Number(u64::from(value))
    }
}

impl From<Vec<u32>> for FieldValue {
    fn from(value: Vec<u32>) -> Self {
        FieldValue::Cutoffs(value)
    }
}

impl From<PruneTechnique> for FieldValue {
    fn from(value: PruneTechnique) -> Self {
        FieldValue::Text(value.as_str().to_string())
    }
}

impl From<ModelName> for FieldValue {
    fn from(value: ModelName) -> Self {
        FieldValue::Text(value.as_str().to_string())
    }
}

impl From<SeedMode> for FieldValue {
    fn from(value: SeedMode) -> Self {
        FieldValue::Text(value.as_str().to_string())
    }
}

/// Encodes cutoffs as `-`-joined decimals, e.g. `1-5-10`.
pub fn encode_cutoffs(cutoffs: &[u32]) -> String {
    cutoffs
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Ordered dimension values identifying one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterTuple {
    fields: Vec<(Dimension, FieldValue)>,
}

impl ParameterTuple {
    /// Creates an empty tuple.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `dimension`, replacing an existing binding in place.
    pub fn with(mut self, dimension: Dimension, value: impl Into<FieldValue>) -> Self {
        self.set(dimension, value);
        self
    }

    /// Binds `dimension`, replacing an existing binding in place.
    pub fn set(&mut self, dimension: Dimension, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(dim, _)| *dim == dimension) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((dimension, value)),
        }
    }

    /// Returns the value bound to `dimension`.
    pub fn get(&self, dimension: Dimension) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(dim, _)| *dim == dimension)
            .map(|(_, value)| value)
    }

    /// Returns a text binding.
    pub fn text(&self, dimension: Dimension) -> Option<&str> {
        match self.get(dimension) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Returns a numeric binding.
    pub fn number(&self, dimension: Dimension) -> Option<u64> {
        match self.get(dimension) {
            Some(FieldValue::Number(number)) => Some(*number),
            _ => None,
        }
    }

    /// Returns the cutoff binding.
    pub fn cutoffs(&self, dimension: Dimension) -> Option<&[u32]> {
        match self.get(dimension) {
            Some(FieldValue::Cutoffs(cutoffs)) => Some(cutoffs),
            _ => None,
        }
    }

    /// Dataset identifier, if bound.
    pub fn dataset(&self) -> Option<&str> {
        self.text(Dimension::Dataset)
    }

    /// Parsed pruning technique, if bound and valid.
    pub fn prune(&self) -> Option<PruneTechnique> {
        self.text(Dimension::PruneTechnique)?.parse().ok()
    }

    /// Split technique identifier, if bound.
    pub fn split(&self) -> Option<&str> {
        self.text(Dimension::SplitTechnique)
    }

    /// Parsed model name, if bound and valid.
    pub fn model(&self) -> Option<ModelName> {
        self.text(Dimension::ModelName)?.parse().ok()
    }

    /// Parsed seed mode, if bound and valid.
    pub fn seed_mode(&self) -> Option<SeedMode> {
        self.text(Dimension::SeedMode)?.parse().ok()
    }

    /// Fold index, if bound.
    pub fn fold(&self) -> Option<u32> {
        self.number(Dimension::FoldIndex)
            .and_then(|fold| u32::try_from(fold).ok())
    }

    /// Shuffle seed, if bound.
    pub fn shuffle_seed(&self) -> Option<u64> {
        self.number(Dimension::ShuffleSeed)
    }

    /// Dimensions in binding order.
    pub fn dimensions(&self) -> Vec<Dimension> {
        self.fields.iter().map(|(dim, _)| *dim).collect()
    }

    /// Iterates over bindings in order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &FieldValue)> {
        self.fields.iter().map(|(dim, value)| (*dim, value))
    }

    /// Copies the listed dimensions, in the listed order.
    ///
    /// Returns `None` if any of them is unbound.
    pub fn project(&self, dimensions: &[Dimension]) -> Option<ParameterTuple> {
        let mut projected = ParameterTuple::new();
        for dim in dimensions {
            projected.fields.push((*dim, self.get(*dim)?.clone()));
        }
        Some(projected)
    }

    /// Number of bound dimensions.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no dimension is bound.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for ParameterTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (dim, value) in &self.fields {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{dim}={value}")?;
        }
        Ok(())
    }
}

/// One component of a stage directory template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirPart {
    /// The raw value of a dimension.
    Field(Dimension),
    /// A fixed component.
    Literal(&'static str),
    /// A fixed prefix followed by the value of a dimension.
    Prefixed(&'static str, Dimension),
}

/// Directory, file fields and suffix of one stage's artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySchema {
    /// Stage producing the artifacts.
    pub stage: Stage,
    /// Directory template relative to the store root.
    pub directory: &'static [DirPart],
    /// Dimensions joined into the file name, in order.
    pub file_fields: &'static [Dimension],
    /// Suffix of the primary artifact.
    pub suffix: &'static str,
    /// Suffixes of side-channel files sharing the same fields.
    pub side_channels: &'static [&'static str],
}

use Dimension as D;

const CLEAN: KeySchema = KeySchema {
    stage: Stage::Clean,
    directory: &[DirPart::Field(D::Dataset), DirPart::Literal("clean")],
    file_fields: &[],
    suffix: "cleaned.csv",
    side_channels: &[],
};

const PRUNE: KeySchema = KeySchema {
    stage: Stage::Prune,
    directory: &[DirPart::Field(D::Dataset), DirPart::Literal("prune")],
    file_fields: &[D::PruneTechnique],
    suffix: "pruned.csv",
    side_channels: &[],
};

const SPLIT: KeySchema = KeySchema {
    stage: Stage::Split,
    directory: &[DirPart::Field(D::Dataset), DirPart::Literal("split")],
    file_fields: &[D::FoldIndex, D::ShuffleSeed, D::PruneTechnique, D::SplitTechnique],
    suffix: "split.csv",
    side_channels: &[],
};

/// Suffix of the seed file written next to every fitted model.
pub const SEED_SUFFIX: &str = "seed.txt";

const FIT: KeySchema = KeySchema {
    stage: Stage::Fit,
    directory: &[DirPart::Field(D::Dataset), DirPart::Prefixed("model_", D::ModelName)],
    file_fields: &[
        D::FoldIndex,
        D::ShuffleSeed,
        D::PruneTechnique,
        D::SplitTechnique,
        D::SeedMode,
    ],
    suffix: "model.bin",
    side_channels: &[SEED_SUFFIX],
};

const PREDICT: KeySchema = KeySchema {
    stage: Stage::Predict,
    directory: &[
        DirPart::Field(D::Dataset),
        DirPart::Prefixed("predictions_", D::ModelName),
    ],
    file_fields: &[
        D::FoldIndex,
        D::ShuffleSeed,
        D::PruneTechnique,
        D::SplitTechnique,
        D::SeedMode,
        D::BatchCount,
        D::BatchIndex,
    ],
    suffix: "predictions.bin",
    side_channels: &[],
};

const EVALUATE: KeySchema = KeySchema {
    stage: Stage::Evaluate,
    directory: &[
        DirPart::Field(D::Dataset),
        DirPart::Prefixed("evaluations_", D::ModelName),
    ],
    file_fields: &[
        D::FoldIndex,
        D::ShuffleSeed,
        D::PruneTechnique,
        D::SplitTechnique,
        D::SeedMode,
        D::BatchCount,
        D::TopnCutoffs,
    ],
    suffix: "evaluation.json",
    side_channels: &[],
};

const REPORT: KeySchema = KeySchema {
    stage: Stage::Report,
    directory: &[],
    file_fields: &[],
    suffix: "evaluation_report.json",
    side_channels: &[],
};

const PLOT: KeySchema = KeySchema {
    stage: Stage::Plot,
    directory: &[DirPart::Literal("plots"), DirPart::Field(D::ModelName)],
    file_fields: &[D::PruneTechnique, D::SplitTechnique],
    suffix: "plot.csv",
    side_channels: &[],
};

/// Key schema of `stage`.
pub fn schema(stage: Stage) -> &'static KeySchema {
    match stage {
        Stage::Clean => &CLEAN,
        Stage::Prune => &PRUNE,
        Stage::Split => &SPLIT,
        Stage::Fit => &FIT,
        Stage::Predict => &PREDICT,
        Stage::Evaluate => &EVALUATE,
        Stage::Report => &REPORT,
        Stage::Plot => &PLOT,
    }
}

impl KeySchema {
    /// Dimensions bound by the directory template, in order.
    pub fn directory_dimensions(&self) -> Vec<Dimension> {
        self.directory
            .iter()
            .filter_map(|part| match part {
                DirPart::Field(dim) | DirPart::Prefixed(_, dim) => Some(*dim),
                DirPart::Literal(_) => None,
            })
            .collect()
    }

    /// Every dimension of a tuple keyed by this schema: directory first, then file fields.
    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dims = self.directory_dimensions();
        dims.extend_from_slice(self.file_fields);
        dims
    }

    /// Builds the directory from a tuple that binds at least the directory dimensions.
    pub fn directory_for(&self, tuple: &ParameterTuple) -> Result<PathBuf, RseError> {
        let mut dir = PathBuf::new();
        for part in self.directory {
            match part {
                DirPart::Literal(text) => dir.push(text),
                DirPart::Field(dim) => dir.push(self.directory_value(tuple, *dim)?),
                DirPart::Prefixed(prefix, dim) => {
                    dir.push(format!("{prefix}{}", self.directory_value(tuple, *dim)?))
                }
            }
        }
        Ok(dir)
    }

    fn directory_value(&self, tuple: &ParameterTuple, dim: Dimension) -> Result<String, RseError> {
        let value = tuple.get(dim).ok_or_else(|| {
            encode_error(self.stage, "missing-dimension", format!("{dim} is not bound"))
        })?;
        let text = value.to_string();
        let invalid = text.is_empty()
            || text.contains('/')
            || text.contains('\\')
            || text.chars().all(|c| c == '.');
        if invalid {
            return Err(encode_error(
                self.stage,
                "invalid-directory-value",
                format!("{dim} value '{text}' cannot name a directory"),
            ));
        }
        Ok(text)
    }
}

fn encode_error(stage: Stage, code: &str, message: String) -> RseError {
    RseError::Config(ErrorInfo::new(code, message).with_context("stage", stage.name()))
}

fn decode_error(stage: Stage, name: &str, message: impl Into<String>) -> RseError {
    RseError::Decode(
        ErrorInfo::new("artifact-name", message)
            .with_context("stage", stage.name())
            .with_context("name", name),
    )
}

/// Address of one artifact relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    stage: Stage,
    directory: PathBuf,
    stem: String,
}

impl ArtifactKey {
    /// Stage that produces the artifact.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Directory relative to the store root.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File name of the primary artifact.
    pub fn file_name(&self) -> String {
        self.file_name_with(schema(self.stage).suffix)
    }

    /// File name sharing this key's fields but ending in `suffix`.
    pub fn file_name_with(&self, suffix: &str) -> String {
        if self.stem.is_empty() {
            suffix.to_string()
        } else {
            format!("{}{}{}", self.stem, KEY_DELIMITER, suffix)
        }
    }

    /// Path of the primary artifact relative to the store root.
    pub fn relative_path(&self) -> PathBuf {
        self.directory.join(self.file_name())
    }

    /// Path of a side-channel file relative to the store root.
    pub fn side_channel_path(&self, suffix: &str) -> PathBuf {
        self.directory.join(self.file_name_with(suffix))
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// Encodes `tuple` into the key of a `stage` artifact.
///
/// The tuple must bind exactly the schema dimensions in schema order.
pub fn encode(tuple: &ParameterTuple, stage: Stage) -> Result<ArtifactKey, RseError> {
    let schema = schema(stage);
    let expected = schema.dimensions();
    if tuple.dimensions() != expected {
        return Err(RseError::Config(
            ErrorInfo::new(
                "dimension-mismatch",
                format!("tuple does not match the {stage} key schema"),
            )
            .with_context("stage", stage.name())
            .with_context("expected", join_dims(&expected))
            .with_context("actual", join_dims(&tuple.dimensions())),
        ));
    }
    for (dim, value) in tuple.iter() {
        if value.kind() != dim.kind() {
            return Err(encode_error(
                stage,
                "value-kind",
                format!("{dim} is bound to a value of the wrong kind"),
            ));
        }
    }

    let directory = schema.directory_for(tuple)?;
    let mut segments = Vec::with_capacity(schema.file_fields.len());
    for dim in schema.file_fields {
        let value = tuple
            .get(*dim)
            .ok_or_else(|| encode_error(stage, "missing-dimension", format!("{dim} is not bound")))?;
        let text = value.to_string();
        if text.is_empty() || text.contains(KEY_DELIMITER) {
            return Err(encode_error(
                stage,
                "reserved-delimiter",
                format!("{dim} value '{text}' is empty or contains '{KEY_DELIMITER}'"),
            ));
        }
        segments.push(text);
    }

    let delimiter = KEY_DELIMITER.to_string();
    Ok(ArtifactKey {
        stage,
        directory,
        stem: segments.join(delimiter.as_str()),
    })
}

fn join_dims(dims: &[Dimension]) -> String {
    dims.iter().map(|d| d.name()).collect::<Vec<_>>().join(",")
}

/// Decodes the file dimensions of a primary `stage` artifact name.
pub fn decode_file_name(file_name: &str, stage: Stage) -> Result<ParameterTuple, RseError> {
    decode_file_name_with(file_name, stage, schema(stage).suffix)
}

/// Decodes the file dimensions of a name ending in `suffix`.
pub fn decode_file_name_with(
    file_name: &str,
    stage: Stage,
    suffix: &str,
) -> Result<ParameterTuple, RseError> {
    let schema = schema(stage);
    if schema.file_fields.is_empty() {
        return if file_name == suffix {
            Ok(ParameterTuple::new())
        } else {
            Err(decode_error(stage, file_name, "unexpected file name"))
        };
    }
    let stem = file_name
        .strip_suffix(suffix)
        .and_then(|rest| rest.strip_suffix(KEY_DELIMITER))
        .ok_or_else(|| decode_error(stage, file_name, format!("suffix is not '{suffix}'")))?;
    let segments: Vec<&str> = stem.split(KEY_DELIMITER).collect();
    if segments.len() != schema.file_fields.len() {
        return Err(decode_error(
            stage,
            file_name,
            format!(
                "expected {} fields, found {}",
                schema.file_fields.len(),
                segments.len()
            ),
        ));
    }
    let mut tuple = ParameterTuple::new();
    for (dim, segment) in schema.file_fields.iter().zip(segments) {
        let value = parse_value(*dim, segment)
            .map_err(|message| decode_error(stage, file_name, message))?;
        tuple.fields.push((*dim, value));
    }
    Ok(tuple)
}

/// Decodes a primary artifact path relative to the store root into its full tuple.
pub fn decode_relative(path: &Path, stage: Stage) -> Result<ParameterTuple, RseError> {
    let schema = schema(stage);
    let display = path.display().to_string();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => components.push(
                part.to_str()
                    .ok_or_else(|| decode_error(stage, &display, "path is not valid UTF-8"))?,
            ),
            _ => return Err(decode_error(stage, &display, "path is not relative")),
        }
    }
    let (file_name, dirs) = components
        .split_last()
        .ok_or_else(|| decode_error(stage, &display, "empty path"))?;
    if dirs.len() != schema.directory.len() {
        return Err(decode_error(stage, &display, "directory depth mismatch"));
    }

    let mut tuple = ParameterTuple::new();
    for (part, dir) in schema.directory.iter().zip(dirs) {
        match part {
            DirPart::Literal(text) => {
                if dir != text {
                    return Err(decode_error(stage, &display, format!("expected '{text}'")));
                }
            }
            DirPart::Field(dim) => {
                let value = parse_value(*dim, dir).map_err(|m| decode_error(stage, &display, m))?;
                tuple.fields.push((*dim, value));
            }
            DirPart::Prefixed(prefix, dim) => {
                let raw = dir.strip_prefix(prefix).ok_or_else(|| {
                    decode_error(stage, &display, format!("expected prefix '{prefix}'"))
                })?;
                let value = parse_value(*dim, raw).map_err(|m| decode_error(stage, &display, m))?;
                tuple.fields.push((*dim, value));
            }
        }
    }
    let file_part = decode_file_name(file_name, stage)?;
    tuple.fields.extend(file_part.fields);
    Ok(tuple)
}

fn parse_value(dim: Dimension, raw: &str) -> Result<FieldValue, String> {
    match dim.kind() {
        ValueKind::Number => parse_number(raw)
            .map(FieldValue::Number)
            .ok_or_else(|| format!("{dim} '{raw}' is not a canonical integer")),
        ValueKind::Cutoffs => parse_cutoffs(raw)
            .map(FieldValue::Cutoffs)
            .ok_or_else(|| format!("{dim} '{raw}' is not a cutoff list")),
        ValueKind::Text => {
            let known = match dim {
                Dimension::PruneTechnique => raw.parse::<PruneTechnique>().is_ok(),
                Dimension::ModelName => raw.parse::<ModelName>().is_ok(),
                Dimension::SeedMode => raw.parse::<SeedMode>().is_ok(),
                _ => validate_identifier(dim.name(), raw).is_ok(),
            };
            if known {
                Ok(FieldValue::Text(raw.to_string()))
            } else {
                Err(format!("{dim} '{raw}' is not recognised"))
            }
        }
    }
}

fn parse_number(raw: &str) -> Option<u64> {
    let canonical = !raw.is_empty()
        && raw.bytes().all(|b| b.is_ascii_digit())
        && (raw == "0" || !raw.starts_with('0'));
    if canonical {
        raw.parse().ok()
    } else {
        None
    }
}

fn parse_cutoffs(raw: &str) -> Option<Vec<u32>> {
    raw.split('-')
        .map(|part| parse_number(part).and_then(|n| u32::try_from(n).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit_tuple() -> ParameterTuple {
        ParameterTuple::new()
            .with(D::Dataset, "WeatherData")
            .with(D::ModelName, ModelName::DecisionTree)
            .with(D::FoldIndex, 2u32)
            .with(D::ShuffleSeed, 7u64)
            .with(D::PruneTechnique, PruneTechnique::None)
            .with(D::SplitTechnique, "random")
            .with(D::SeedMode, SeedMode::Random)
    }

    #[test]
    fn fit_key_layout() {
        let key = encode(&fit_tuple(), Stage::Fit).unwrap();
        assert_eq!(
            key.relative_path(),
            Path::new("WeatherData/model_decision_tree/2_7_none_random_random_model.bin")
        );
        assert_eq!(
            key.side_channel_path(SEED_SUFFIX),
            Path::new("WeatherData/model_decision_tree/2_7_none_random_random_seed.txt")
        );
    }

    #[test]
    fn clean_and_report_have_bare_suffix() {
        let clean = ParameterTuple::new().with(D::Dataset, "Housing");
        assert_eq!(
            encode(&clean, Stage::Clean).unwrap().relative_path(),
            Path::new("Housing/clean/cleaned.csv")
        );
        assert_eq!(
            encode(&ParameterTuple::new(), Stage::Report)
                .unwrap()
                .relative_path(),
            Path::new("evaluation_report.json")
        );
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let tuple = fit_tuple().with(D::BatchIndex, 0u32);
        let err = encode(&tuple, Stage::Fit).unwrap_err();
        assert!(matches!(err, RseError::Config(_)));
        assert_eq!(err.info().code, "dimension-mismatch");
    }

    #[test]
    fn decode_rejects_foreign_names() {
        for name in [
            "notes.txt",
            "2_7_none_random_model.bin",
            "2_07_none_random_random_model.bin",
            "2_7_trim_random_random_model.bin",
            "x_7_none_random_random_model.bin",
        ] {
            let err = decode_file_name(name, Stage::Fit).unwrap_err();
            assert!(matches!(err, RseError::Decode(_)), "{name} decoded");
        }
    }

    #[test]
    fn cutoffs_encode_with_dashes() {
        assert_eq!(encode_cutoffs(&[1, 5, 10]), "1-5-10");
        assert_eq!(parse_cutoffs("1-5-10"), Some(vec![1, 5, 10]));
        assert_eq!(parse_cutoffs("1--5"), None);
    }
}
