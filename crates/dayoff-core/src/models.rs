//! Core data models for the day-off pipeline

use crate::contract::{IMPUTE_WIDTH, SCALE_WIDTH};
use crate::error::{ensure_len, stages, PipelineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Raw station observation plus storm metadata for one inference request
///
/// A key that is present with a missing value (`None`) is distinct from an
/// absent key: the former is filled by the imputer, the latter fails the
/// contract check for imputable columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    station: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    observed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_values")]
    values: BTreeMap<String, Option<f64>>,
    #[serde(
        default,
        deserialize_with = "deserialize_route",
        skip_serializing_if = "Option::is_none"
    )]
    route: Option<String>,
}

impl RawRecord {
    pub fn builder(station: impl Into<String>) -> RawRecordBuilder {
        RawRecordBuilder {
            record: RawRecord {
                station: station.into(),
                observed_at: None,
                values: BTreeMap::new(),
                route: None,
            },
        }
    }

    /// Start a builder pre-populated with this record's contents
    pub fn to_builder(&self) -> RawRecordBuilder {
        RawRecordBuilder {
            record: self.clone(),
        }
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// True if the key exists, whether or not it carries a value
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The value for `name`, or `None` when absent or missing
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builder for [`RawRecord`]; non-finite values are stored as missing
#[derive(Debug, Clone)]
pub struct RawRecordBuilder {
    record: RawRecord,
}

impl RawRecordBuilder {
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.observed_at = Some(at);
        self
    }

    pub fn value(self, name: impl Into<String>, value: f64) -> Self {
        self.maybe(name, Some(value))
    }

    /// Declare a key whose value is missing
    pub fn missing(self, name: impl Into<String>) -> Self {
        self.maybe(name, None)
    }

    pub fn maybe(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        let value = value.filter(|v| v.is_finite());
        self.record.values.insert(name.into(), value);
        self
    }

    /// Insert only when the key is not already present
    pub fn fill(mut self, name: &str, value: Option<f64>) -> Self {
        if !self.record.values.contains_key(name) {
            self.record
                .values
                .insert(name.to_string(), value.filter(|v| v.is_finite()));
        }
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.record.route = Some(route.into().trim().to_string());
        self
    }

    pub fn fill_route(self, route: Option<&str>) -> Self {
        match (self.record.route.is_some(), route) {
            (false, Some(r)) => self.route(r),
            _ => self,
        }
    }

    pub fn build(self) -> RawRecord {
        self.record
    }
}

/// Coerce a JSON value to a number the way the training table was coerced
pub fn coerce_numeric(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn deserialize_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| {
            let coerced = coerce_numeric(&value);
            (name, coerced)
        })
        .collect())
}

fn deserialize_route<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| route_label(&value)))
}

/// Normalize a route label: strings are trimmed, integral numbers printed as integers
pub fn route_label(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => n.as_f64().map(|v| {
            if v.fract() == 0.0 {
                format!("{}", v as i64)
            } else {
                v.to_string()
            }
        }),
        _ => None,
    }
}

/// Imputer output: 13 values aligned to `IMPUTE_COLUMNS`, none missing
#[derive(Debug, Clone, PartialEq)]
pub struct ImputedVector(Vec<f64>);

impl ImputedVector {
    pub(crate) fn new(values: Vec<f64>) -> Result<Self, PipelineError> {
        ensure_len(stages::IMPUTER, IMPUTE_WIDTH, values.len())?;
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Augmenter output: 24 finite values aligned to `SCALE_COLUMNS`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub(crate) fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Scaler output consumed by the classifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaledVector(Vec<f64>);

impl ScaledVector {
    /// Wrap already-scaled values; the width must match the scale contract
    pub fn from_values(values: Vec<f64>) -> Result<Self, PipelineError> {
        ensure_len(stages::CLASSIFIER, SCALE_WIDTH, values.len())?;
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Probability of a day off, tagged with the originating record identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub station: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
    /// Probability of the positive class ("day off"), in [0, 1]
    pub probability: f64,
    /// Imputable columns that arrived missing and were filled
    pub imputed_columns: Vec<String>,
    pub contract_version: String,
    pub classifier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_but_missing_is_distinct_from_absent() {
        let record = RawRecord::builder("Taipei")
            .missing("RH")
            .value("Precp", 3.5)
            .build();

        assert!(record.contains("RH"));
        assert_eq!(record.value("RH"), None);
        assert!(!record.contains("lat"));
        assert_eq!(record.value("Precp"), Some(3.5));
    }

    #[test]
    fn test_builder_stores_non_finite_as_missing() {
        let record = RawRecord::builder("Taipei")
            .value("Precp", f64::NAN)
            .value("RH", f64::INFINITY)
            .build();
        assert!(record.contains("Precp"));
        assert_eq!(record.value("Precp"), None);
        assert_eq!(record.value("RH"), None);
    }

    #[test]
    fn test_fill_keeps_existing_values() {
        let record = RawRecord::builder("Taipei")
            .value("hpa", 990.0)
            .fill("hpa", Some(955.0))
            .fill("TyWS", Some(40.0))
            .build();
        assert_eq!(record.value("hpa"), Some(990.0));
        assert_eq!(record.value("TyWS"), Some(40.0));
    }

    #[test]
    fn test_json_values_are_coerced() {
        let json = r#"{
            "station": "Tamsui",
            "observed_at": "2024-07-24T06:00:00Z",
            "values": {"Precp": 12.5, "RH": "81", "lat": null, "lon": "n/a", "hpa": true},
            "route": 3
        }"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.station(), "Tamsui");
        assert!(record.observed_at().is_some());
        assert_eq!(record.value("Precp"), Some(12.5));
        assert_eq!(record.value("RH"), Some(81.0));
        assert!(record.contains("lat"));
        assert_eq!(record.value("lat"), None);
        assert_eq!(record.value("lon"), None);
        assert_eq!(record.value("hpa"), None);
        assert_eq!(record.route(), Some("3"));
    }

    #[test]
    fn test_route_label_normalization() {
        assert_eq!(route_label(&serde_json::json!(" -- ")), Some("--".to_string()));
        assert_eq!(route_label(&serde_json::json!(2.0)), Some("2".to_string()));
        assert_eq!(route_label(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_scaled_vector_width_checked() {
        assert!(ScaledVector::from_values(vec![0.0; SCALE_WIDTH]).is_ok());
        let err = ScaledVector::from_values(vec![0.0; 3]).unwrap_err();
        assert_eq!(err.kind(), "shape_mismatch");
    }
}
