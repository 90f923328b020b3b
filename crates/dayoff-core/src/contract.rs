//! Feature contract shared by training and inference
//!
//! The imputer is fitted on `IMPUTE_COLUMNS` and the scaler on
//! `SCALE_COLUMNS`, both in exactly this order. Every fitted artifact
//! persists the column list and contract version it was fitted against,
//! and loading rejects any artifact whose list differs.

use crate::error::PipelineError;
use std::collections::HashSet;

/// Version tag persisted into fitted artifacts
pub const CONTRACT_VERSION: &str = "dayoff-features/v1";

/// Number of imputable columns
pub const IMPUTE_WIDTH: usize = 13;

/// Number of scaled (model input) columns
pub const SCALE_WIDTH: usize = 24;

/// Columns filled by the KNN imputer, in fitted order
pub const IMPUTE_COLUMNS: [&str; IMPUTE_WIDTH] = [
    "Precp",
    "RH",
    "StnHeight",
    "StnPres",
    "T.Max",
    "T.Min",
    "Temperature",
    "WDGust_vector_x",
    "WDGust_vector_y",
    "WD_vector_x",
    "WD_vector_y",
    "lat",
    "lon",
];

/// Columns consumed by the scaler and classifier, in fitted order
pub const SCALE_COLUMNS: [&str; SCALE_WIDTH] = [
    "Dayoff",
    "Precp",
    "RH",
    "StnHeight",
    "StnPres",
    "T.Max",
    "T.Min",
    "Temperature",
    "TyWS",
    "WDGust_vector_x",
    "WDGust_vector_y",
    "WD_vector_x",
    "WD_vector_y",
    "X10_radius",
    "X7_radius",
    "alert_num",
    "born_spotE",
    "born_spotN",
    "hpa",
    "lat",
    "lon",
    "route_--",
    "route_2",
    "route_3",
];

/// Storm metadata copied through verbatim (defaulting to 0)
pub const METADATA_COLUMNS: [&str; 8] = [
    "Dayoff",
    "TyWS",
    "X10_radius",
    "X7_radius",
    "alert_num",
    "born_spotE",
    "born_spotN",
    "hpa",
];

/// One-hot storm route flags
pub const ROUTE_COLUMNS: [&str; 3] = ["route_--", "route_2", "route_3"];

/// Ordered column lists for the two numeric stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureContract {
    version: &'static str,
    impute: &'static [&'static str],
    scale: &'static [&'static str],
}

impl Default for FeatureContract {
    fn default() -> Self {
        Self::current()
    }
}

impl FeatureContract {
    /// The contract the shipped artifacts were fitted against
    pub const fn current() -> Self {
        Self {
            version: CONTRACT_VERSION,
            impute: &IMPUTE_COLUMNS,
            scale: &SCALE_COLUMNS,
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn impute_columns(&self) -> &'static [&'static str] {
        self.impute
    }

    pub fn scale_columns(&self) -> &'static [&'static str] {
        self.scale
    }

    /// Position of a column inside the scale ordering
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.scale.iter().position(|c| *c == name)
    }

    /// Scale-space index of each impute column, in impute order
    pub fn impute_positions(&self) -> Vec<usize> {
        self.impute
            .iter()
            .filter_map(|name| self.position_of(name))
            .collect()
    }

    /// Check the structural invariants: no duplicates, impute ⊂ scale
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (label, columns) in [("impute", self.impute), ("scale", self.scale)] {
            let mut seen = HashSet::new();
            for column in columns {
                if !seen.insert(*column) {
                    return Err(PipelineError::contract(format!(
                        "duplicate {} column '{}'",
                        label, column
                    )));
                }
            }
        }

        if let Some(missing) = self.impute.iter().find(|c| self.position_of(c).is_none()) {
            return Err(PipelineError::contract(format!(
                "impute column '{}' is not part of the scale columns",
                missing
            )));
        }

        Ok(())
    }

    /// Reject an artifact whose persisted columns differ from `expected`
    pub fn ensure_matches(
        &self,
        artifact: &str,
        expected: &[&str],
        declared: &[String],
    ) -> Result<(), PipelineError> {
        if declared.len() != expected.len() {
            return Err(PipelineError::contract(format!(
                "{} was fitted on {} columns, contract {} has {}",
                artifact,
                declared.len(),
                self.version,
                expected.len()
            )));
        }

        for (idx, (have, want)) in declared.iter().zip(expected).enumerate() {
            if have != want {
                return Err(PipelineError::contract(format!(
                    "{} column {} is '{}', contract {} expects '{}'",
                    artifact, idx, have, self.version, want
                )));
            }
        }

        Ok(())
    }
}

/// Owned copy of a column list, as persisted in artifacts
pub fn owned_columns(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}
