//! Artifact keys, grid expansion, the artifact store and the seed registry.

pub mod grid;
mod hash;
pub mod key;
pub mod seeds;
mod serde;
pub mod store;

pub use grid::{expand, grid_size, ShuffleSeedSource, SplitSeeds};
pub use hash::{config_hash, stable_hash_string};
pub use key::{
    decode_file_name, decode_relative, encode, encode_cutoffs, schema, ArtifactKey, Dimension,
    FieldValue, KeySchema, ParameterTuple, SEED_SUFFIX,
};
pub use seeds::{format_seed_file, harvest, read_seed_file, SeedBook};
pub use store::{write_atomic, ArtifactStore, Publication, ScannedArtifact};

pub use self::serde::{from_json_slice, to_canonical_json_bytes, to_canonical_json_pretty};
