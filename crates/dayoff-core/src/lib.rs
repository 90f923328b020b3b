//! Typhoon day-off prediction core
//!
//! This crate provides:
//! - The feature contract shared by training and inference
//! - Raw records and the upstream observation adapters
//! - The imputer, augmenter, scaler and classifier stages and their orchestrator
//! - Artifact loading and training-side fitting
//! - Health checks and observability

pub mod artifacts;
pub mod contract;
pub mod error;
pub mod fit;
pub mod health;
pub mod models;
pub mod observability;
pub mod observation;
pub mod pipeline;

pub use artifacts::{ArtifactMetadata, ArtifactPaths, ArtifactSet};
pub use contract::{FeatureContract, CONTRACT_VERSION, IMPUTE_COLUMNS, SCALE_COLUMNS};
pub use error::PipelineError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use observation::{StationObservation, TyphoonProfile};
pub use pipeline::{Classifier, Pipeline};
