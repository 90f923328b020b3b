//! K-nearest-neighbors imputation over the 13 imputable columns
//!
//! Distances use only the coordinates present in both rows, scaled up by
//! the fraction of coordinates that were usable. For every missing entry the
//! `k` nearest fitted rows that have that column present are averaged.

use crate::contract::{owned_columns, FeatureContract, IMPUTE_WIDTH};
use crate::error::{ensure_len, stages, PipelineError};
use crate::models::ImputedVector;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, error};

/// Neighbor count of the shipped imputer
pub const DEFAULT_NEIGHBORS: usize = 5;

/// How neighbor values are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborWeights {
    Uniform,
    /// Inverse-distance weighting
    #[default]
    Distance,
}

/// Persisted form of a fitted imputer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputerArtifact {
    pub contract_version: String,
    pub columns: Vec<String>,
    pub n_neighbors: usize,
    #[serde(default)]
    pub weights: NeighborWeights,
    /// Training rows in column order; `null` marks a missing entry
    pub fit_rows: Vec<Vec<Option<f64>>>,
}

/// Fitted KNN imputer
#[derive(Debug, Clone)]
pub struct KnnImputer {
    n_neighbors: usize,
    weights: NeighborWeights,
    /// Missing entries stored as NaN
    rows: Vec<Vec<f64>>,
    column_means: Vec<f64>,
}

impl KnnImputer {
    /// Fit on training rows aligned to `IMPUTE_COLUMNS` (NaN marks missing)
    pub fn fit(
        rows: &[Vec<f64>],
        n_neighbors: usize,
        weights: NeighborWeights,
    ) -> Result<Self, PipelineError> {
        if n_neighbors == 0 {
            return Err(PipelineError::contract("imputer needs at least one neighbor"));
        }
        if rows.is_empty() {
            return Err(PipelineError::contract("imputer needs at least one training row"));
        }
        for row in rows {
            ensure_len(stages::IMPUTER, IMPUTE_WIDTH, row.len())?;
        }

        let column_means = column_means(rows)?;
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|v| if v.is_finite() { *v } else { f64::NAN }).collect())
            .collect();

        Ok(Self {
            n_neighbors,
            weights,
            rows,
            column_means,
        })
    }

    /// Rebuild from a persisted artifact, checking it against the contract
    pub fn from_artifact(
        artifact: ImputerArtifact,
        contract: &FeatureContract,
    ) -> Result<Self, PipelineError> {
        if artifact.contract_version != contract.version() {
            return Err(PipelineError::contract(format!(
                "imputer was fitted for contract {}, running {}",
                artifact.contract_version,
                contract.version()
            )));
        }
        contract.ensure_matches("imputer", contract.impute_columns(), &artifact.columns)?;

        let rows: Vec<Vec<f64>> = artifact
            .fit_rows
            .iter()
            .map(|row| row.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect();

        Self::fit(&rows, artifact.n_neighbors, artifact.weights)
    }

    pub fn to_artifact(&self, contract: &FeatureContract) -> ImputerArtifact {
        ImputerArtifact {
            contract_version: contract.version().to_string(),
            columns: owned_columns(contract.impute_columns()),
            n_neighbors: self.n_neighbors,
            weights: self.weights,
            fit_rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(|v| v.is_finite().then_some(*v)).collect())
                .collect(),
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn weights(&self) -> NeighborWeights {
        self.weights
    }

    pub fn fit_rows(&self) -> usize {
        self.rows.len()
    }

    /// Per-column means of the fitted rows, the fallback when no donor qualifies
    pub fn means(&self) -> &[f64] {
        &self.column_means
    }

    /// Fill every NaN entry of a 13-vector
    pub fn impute(&self, partial: &[f64]) -> Result<ImputedVector, PipelineError> {
        ensure_len(stages::IMPUTER, IMPUTE_WIDTH, partial.len())?;

        let present = partial.iter().filter(|v| v.is_finite()).count();
        if present == 0 {
            error!(stage = stages::IMPUTER, "Row has no present values to measure neighbors from");
            return Err(PipelineError::ShapeMismatch {
                stage: stages::IMPUTER,
                expected: IMPUTE_WIDTH,
                actual: 0,
            });
        }

        let mut filled = partial.to_vec();
        for (col, value) in filled.iter_mut().enumerate() {
            if value.is_finite() {
                continue;
            }
            *value = self.estimate(partial, col);
            debug!(column = col, estimate = *value, "Imputed missing value");
        }

        ImputedVector::new(filled)
    }

    fn estimate(&self, query: &[f64], col: usize) -> f64 {
        let mut donors: Vec<(f64, f64)> = self
            .rows
            .iter()
            .filter(|row| row[col].is_finite())
            .filter_map(|row| nan_euclidean(query, row).map(|d| (d, row[col])))
            .collect();

        if donors.is_empty() {
            return self.column_means[col];
        }

        // Stable sort keeps fitted-row order among equal distances
        donors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        donors.truncate(self.n_neighbors);

        match self.weights {
            NeighborWeights::Uniform => {
                donors.iter().map(|(_, v)| v).sum::<f64>() / donors.len() as f64
            }
            NeighborWeights::Distance => {
                let exact: Vec<f64> = donors
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|(_, v)| *v)
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (weighted, total) = donors
                    .iter()
                    .fold((0.0, 0.0), |(acc, w), (d, v)| (acc + v / d, w + 1.0 / d));
                weighted / total
            }
        }
    }
}

/// Euclidean distance over coordinates present in both rows, scaled by
/// `sqrt(total / present)`. `None` when the rows share no present coordinate.
pub fn nan_euclidean(a: &[f64], b: &[f64]) -> Option<f64> {
    let mut present = 0usize;
    let mut sum_sq = 0.0;
    for (x, y) in a.iter().zip(b) {
        if x.is_finite() && y.is_finite() {
            present += 1;
            sum_sq += (x - y).powi(2);
        }
    }
    if present == 0 {
        return None;
    }
    Some((sum_sq * a.len() as f64 / present as f64).sqrt())
}

fn column_means(rows: &[Vec<f64>]) -> Result<Vec<f64>, PipelineError> {
    (0..IMPUTE_WIDTH)
        .map(|col| {
            let values: Vec<f64> = rows
                .iter()
                .map(|row| row[col])
                .filter(|v| v.is_finite())
                .collect();
            if values.is_empty() {
                return Err(PipelineError::contract(format!(
                    "imputer column {} has no observed values",
                    col
                )));
            }
            Ok(values.iter().sum::<f64>() / values.len() as f64)
        })
        .collect()
}
