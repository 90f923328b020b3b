//! Feature augmentation: from 13 imputed values to the 24-column model input
//!
//! Imputed values are merged back positionally. The remaining columns are
//! derived without any statistics: route one-hot flags, storm metadata
//! copied through (0 when absent), and wind vectors decomposed from raw
//! direction/speed readings.

use crate::contract::{FeatureContract, ROUTE_COLUMNS};
use crate::error::{ensure_len, stages, PipelineError};
use crate::models::{FeatureVector, ImputedVector, RawRecord};
use crate::observation::wind;
use std::f64::consts::PI;

/// Value used for storm metadata the record does not carry
pub const METADATA_DEFAULT: f64 = 0.0;

/// Angular readings and the component columns derived from them
const WIND_COMPONENTS: [(&str, &str, &str, &str); 2] = [
    (wind::DIRECTION, wind::SPEED, "WD_vector_x", "WD_vector_y"),
    (wind::GUST_DIRECTION, wind::GUST_SPEED, "WDGust_vector_x", "WDGust_vector_y"),
];

/// Storm route categories known to the fitted model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCategory {
    /// Unclassified track ("--")
    Unclassified,
    Two,
    Three,
}

impl RouteCategory {
    /// Parse a route label; unknown labels yield `None`
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "--" => Some(RouteCategory::Unclassified),
            "2" | "2.0" => Some(RouteCategory::Two),
            "3" | "3.0" => Some(RouteCategory::Three),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            RouteCategory::Unclassified => ROUTE_COLUMNS[0],
            RouteCategory::Two => ROUTE_COLUMNS[1],
            RouteCategory::Three => ROUTE_COLUMNS[2],
        }
    }
}

/// Decompose a meteorological direction (degrees, clockwise from north)
/// and speed into x/y components scaled by the square root of the speed.
pub fn decompose(direction_deg: f64, speed: f64) -> Option<(f64, f64)> {
    let radians = (90.0 - direction_deg) * PI / 180.0;
    let magnitude = speed.sqrt();
    let x = magnitude * round5(radians.cos());
    let y = magnitude * round5(radians.sin());
    (x.is_finite() && y.is_finite()).then_some((x, y))
}

fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

/// Builds the ordered model input from imputed values and the raw record
#[derive(Debug, Clone)]
pub struct FeatureAugmenter {
    contract: FeatureContract,
    impute_positions: Vec<usize>,
}

impl FeatureAugmenter {
    pub fn new(contract: FeatureContract) -> Self {
        Self {
            impute_positions: contract.impute_positions(),
            contract,
        }
    }

    /// Add wind/gust vector components for records that only carry raw
    /// angular readings. Components that already carry values are left
    /// untouched; declared-but-missing components are computed when the raw
    /// readings allow it.
    pub fn derive_components(&self, record: &RawRecord) -> RawRecord {
        let mut builder = record.to_builder();
        for (direction, speed, x_col, y_col) in WIND_COMPONENTS {
            if record.value(x_col).is_some() && record.value(y_col).is_some() {
                continue;
            }
            if !record.contains(direction) && !record.contains(speed) {
                continue;
            }
            let components = match (record.value(direction), record.value(speed)) {
                (Some(d), Some(s)) => decompose(d, s),
                _ => None,
            };
            let derived = [
                (x_col, components.map(|c| c.0)),
                (y_col, components.map(|c| c.1)),
            ];
            for (column, value) in derived {
                builder = if record.value(column).is_none() && value.is_some() {
                    builder.maybe(column, value)
                } else {
                    builder.fill(column, value)
                };
            }
        }
        builder.build()
    }

    /// One-hot route flags in `ROUTE_COLUMNS` order; unknown or absent routes are all zero
    pub fn route_flags(&self, record: &RawRecord) -> [f64; 3] {
        let category = record.route().and_then(RouteCategory::parse);
        let mut flags = [0.0; 3];
        if let Some(category) = category {
            for (flag, column) in flags.iter_mut().zip(ROUTE_COLUMNS) {
                if column == category.column() {
                    *flag = 1.0;
                }
            }
        }
        flags
    }

    /// Assemble the full vector in scale-column order
    pub fn augment(
        &self,
        imputed: &ImputedVector,
        record: &RawRecord,
    ) -> Result<FeatureVector, PipelineError> {
        let columns = self.contract.scale_columns();
        let mut values = vec![f64::NAN; columns.len()];

        for (value, position) in imputed.as_slice().iter().zip(&self.impute_positions) {
            values[*position] = *value;
        }

        let flags = self.route_flags(record);
        for (idx, column) in columns.iter().enumerate() {
            if self.impute_positions.contains(&idx) {
                continue;
            }
            values[idx] = match ROUTE_COLUMNS.iter().position(|r| r == column) {
                Some(route_idx) => flags[route_idx],
                None => record.value(column).unwrap_or(METADATA_DEFAULT),
            };
        }

        ensure_len(stages::AUGMENTER, columns.len(), values.len())?;
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::contract(format!(
                "column '{}' is not numeric after encoding",
                columns[idx]
            )));
        }

        Ok(FeatureVector::new(values))
    }
}
