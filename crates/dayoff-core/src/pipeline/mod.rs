//! Feature alignment and inference pipeline
//!
//! Record -> imputer (13 columns) -> augmenter (24 columns) -> scaler -> classifier.

mod augmenter;
mod imputer;
mod inference;
mod orchestrator;
mod scaler;


pub use augmenter::{decompose, FeatureAugmenter, RouteCategory, METADATA_DEFAULT};
pub use imputer::{nan_euclidean, ImputerArtifact, KnnImputer, NeighborWeights, DEFAULT_NEIGHBORS};
pub use inference::{
    ForestArtifact, ForestClassifier, OnnxClassifier, TreeArtifact, POSITIVE_CLASS,
};
pub use orchestrator::Pipeline;
pub use scaler::{MinMaxScaler, ScalerArtifact};

use crate::error::PipelineError;
use crate::models::ScaledVector;

/// Opaque probability model consuming the scaled 24-vector
pub trait Classifier: Send + Sync {
    /// Probability of the positive ("day off") class
    fn predict_proba(&self, features: &ScaledVector) -> Result<f64, PipelineError>;

    /// Short human-readable description of the loaded model
    fn describe(&self) -> String;
}
