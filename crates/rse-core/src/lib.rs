#![deny(missing_docs)]
#![doc = "Core configuration, stage and error types for the random seed effects pipeline."]

pub mod config;
pub mod errors;
pub mod provenance;
pub mod rng;
pub mod stage;

pub use config::{load_config, ExperimentConfig, ModelName, PruneTechnique, SeedMode, StageCommand};
pub use errors::{ErrorInfo, RseError};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{model_seed, RngHandle, SeedRequest, STATIC_MODEL_SEED};
pub use stage::Stage;
