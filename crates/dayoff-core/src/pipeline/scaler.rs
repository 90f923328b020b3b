//! Min-max scaling of the 24-column feature vector
//!
//! `value' = (value - min) / (max - min)` per column, with the bounds fitted
//! at training time. Values outside the fitted range are not clipped unless
//! the artifact says so: they extrapolate linearly, as they did when the
//! classifier was trained.

use crate::contract::{owned_columns, FeatureContract, SCALE_WIDTH};
use crate::error::{ensure_len, stages, PipelineError};
use crate::models::ScaledVector;
use serde::{Deserialize, Serialize};

/// Persisted form of a fitted scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub contract_version: String,
    pub columns: Vec<String>,
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
    #[serde(default)]
    pub clip: bool,
}

/// Fitted min-max scaler
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    data_min: Vec<f64>,
    data_max: Vec<f64>,
    /// Zero-width ranges are stored as 1 so constant columns map to `value - min`
    range: Vec<f64>,
    clip: bool,
}

impl MinMaxScaler {
    pub fn new(data_min: Vec<f64>, data_max: Vec<f64>, clip: bool) -> Result<Self, PipelineError> {
        ensure_len(stages::SCALER, SCALE_WIDTH, data_min.len())?;
        ensure_len(stages::SCALER, SCALE_WIDTH, data_max.len())?;

        let mut range = Vec::with_capacity(SCALE_WIDTH);
        for (idx, (lo, hi)) in data_min.iter().zip(&data_max).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || hi < lo {
                return Err(PipelineError::contract(format!(
                    "scaler bounds for column {} are invalid: [{}, {}]",
                    idx, lo, hi
                )));
            }
            let width = hi - lo;
            range.push(if width == 0.0 { 1.0 } else { width });
        }

        Ok(Self {
            data_min,
            data_max,
            range,
            clip,
        })
    }

    /// Fit per-column bounds on rows aligned to `SCALE_COLUMNS`
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::contract("scaler needs at least one training row"));
        }
        let mut data_min = vec![f64::INFINITY; SCALE_WIDTH];
        let mut data_max = vec![f64::NEG_INFINITY; SCALE_WIDTH];
        for row in rows {
            ensure_len(stages::SCALER, SCALE_WIDTH, row.len())?;
            for (col, value) in row.iter().enumerate() {
                if value.is_finite() {
                    data_min[col] = data_min[col].min(*value);
                    data_max[col] = data_max[col].max(*value);
                }
            }
        }
        Self::new(data_min, data_max, false)
    }

    /// Rebuild from a persisted artifact; dimensionality must match the contract
    pub fn from_artifact(
        artifact: ScalerArtifact,
        contract: &FeatureContract,
    ) -> Result<Self, PipelineError> {
        if artifact.contract_version != contract.version() {
            return Err(PipelineError::contract(format!(
                "scaler was fitted for contract {}, running {}",
                artifact.contract_version,
                contract.version()
            )));
        }
        contract.ensure_matches("scaler", contract.scale_columns(), &artifact.columns)?;
        Self::new(artifact.data_min, artifact.data_max, artifact.clip)
    }

    pub fn to_artifact(&self, contract: &FeatureContract) -> ScalerArtifact {
        ScalerArtifact {
            contract_version: contract.version().to_string(),
            columns: owned_columns(contract.scale_columns()),
            data_min: self.data_min.clone(),
            data_max: self.data_max.clone(),
            clip: self.clip,
        }
    }

    pub fn data_min(&self) -> &[f64] {
        &self.data_min
    }

    pub fn data_max(&self) -> &[f64] {
        &self.data_max
    }

    pub fn dimension(&self) -> usize {
        self.data_min.len()
    }

    pub fn clips(&self) -> bool {
        self.clip
    }

    /// Scale a 24-vector in contract order
    pub fn scale(&self, values: &[f64]) -> Result<ScaledVector, PipelineError> {
        ensure_len(stages::SCALER, self.dimension(), values.len())?;
        let scaled = values
            .iter()
            .zip(self.data_min.iter().zip(&self.range))
            .map(|(v, (lo, r))| {
                let s = (v - lo) / r;
                if self.clip {
                    s.clamp(0.0, 1.0)
                } else {
                    s
                }
            })
            .collect();
        ScaledVector::from_values(scaled)
    }
}
