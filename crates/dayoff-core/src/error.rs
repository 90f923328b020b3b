//! Error taxonomy for the inference pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage names used in shape errors and logs
pub mod stages {
    pub const IMPUTER: &str = "imputer";
    pub const AUGMENTER: &str = "augmenter";
    pub const SCALER: &str = "scaler";
    pub const CLASSIFIER: &str = "classifier";
}

/// Errors raised by the feature pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required column is absent, or an assembled vector has the wrong composition.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A stage received a vector of unexpected length (internal wiring defect).
    #[error("shape mismatch in {stage}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A fitted artifact could not be loaded. Fatal at startup.
    #[error("failed to load {artifact} artifact from {}: {reason}", path.display())]
    ArtifactLoadFailure {
        artifact: &'static str,
        path: PathBuf,
        reason: String,
    },

    /// The classifier failed while evaluating a well-formed vector.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    pub fn contract(message: impl Into<String>) -> Self {
        PipelineError::ContractViolation(message.into())
    }

    pub fn artifact(
        artifact: &'static str,
        path: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        PipelineError::ArtifactLoadFailure {
            artifact,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ContractViolation(_) => "contract_violation",
            PipelineError::ShapeMismatch { .. } => "shape_mismatch",
            PipelineError::ArtifactLoadFailure { .. } => "artifact_load_failure",
            PipelineError::Inference(_) => "inference",
        }
    }
}

/// Check a vector length at a stage boundary, logging loudly on mismatch
pub(crate) fn ensure_len(
    stage: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), PipelineError> {
    if expected != actual {
        tracing::error!(
            stage = stage,
            expected = expected,
            actual = actual,
            "Vector shape mismatch between pipeline stages"
        );
        return Err(PipelineError::ShapeMismatch {
            stage,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = ensure_len(stages::SCALER, 24, 23).unwrap_err();
        assert_eq!(err.kind(), "shape_mismatch");
        assert_eq!(
            err.to_string(),
            "shape mismatch in scaler: expected 24 values, got 23"
        );
    }

    #[test]
    fn test_artifact_error_includes_path() {
        let err = PipelineError::artifact("scaler", "models/MMscaler.json", "missing file");
        let message = err.to_string();
        assert!(message.contains("models/MMscaler.json"));
        assert!(message.contains("scaler"));
    }
}
