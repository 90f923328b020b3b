//! Upstream adapters that produce raw records
//!
//! `StationObservation` mirrors one `location` entry of the weather
//! service's current-observation dataset. `TyphoonProfile` carries the
//! storm metadata an operator configures for the active typhoon.

use crate::models::{coerce_numeric, RawRecord};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Readings below this value are the service's missing-data sentinel
pub const MISSING_SENTINEL_THRESHOLD: f64 = -90.0;

/// Raw wind direction (degrees) and speed keys carried for vector decomposition
pub mod wind {
    pub const DIRECTION: &str = "WDIR";
    pub const SPEED: &str = "WDSD";
    pub const GUST_DIRECTION: &str = "H_XD";
    pub const GUST_SPEED: &str = "H_FX";
}

/// Service element name -> feature column
const ELEMENT_COLUMNS: &[(&str, &str)] = &[
    ("ELEV", "StnHeight"),
    ("HUMD", "RH"),
    ("D_TX", "T.Max"),
    ("D_TN", "T.Min"),
    ("TEMP", "Temperature"),
    ("PRES", "StnPres"),
    ("24R", "Precp"),
    (wind::DIRECTION, wind::DIRECTION),
    (wind::SPEED, wind::SPEED),
    (wind::GUST_DIRECTION, wind::GUST_DIRECTION),
    (wind::GUST_SPEED, wind::GUST_SPEED),
];

/// Observation times are reported in Taiwan local time
const SERVICE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Full dataset response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationResponse {
    pub records: ObservationRecords,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservationRecords {
    #[serde(default)]
    pub location: Vec<StationObservation>,
}

impl ObservationResponse {
    /// The observation for the requested station, if the service returned one
    pub fn into_first(self) -> Option<StationObservation> {
        self.records.location.into_iter().next()
    }
}

/// One station's current observation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationObservation {
    pub location_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<ObservationTime>,
    #[serde(default)]
    pub weather_element: Vec<WeatherElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationTime {
    pub obs_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherElement {
    pub element_name: String,
    pub element_value: serde_json::Value,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(coerce_numeric))
}

impl StationObservation {
    /// Parse the observation time; accepts RFC 3339 or the service's local format
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.time.as_ref()?.obs_time.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
        let offset = FixedOffset::east_opt(SERVICE_UTC_OFFSET_SECS)?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn element(&self, name: &str) -> Option<f64> {
        let element = self.weather_element.iter().find(|e| e.element_name == name)?;
        let value = coerce_numeric(&element.element_value)?;
        if value < MISSING_SENTINEL_THRESHOLD {
            return None;
        }
        // Humidity is reported as a fraction
        if name == "HUMD" {
            return Some(value * 100.0);
        }
        Some(value)
    }

    /// Convert to a raw record; every mapped column is declared, missing if unreported.
    /// Wind vector components are derived later from the raw wind readings.
    pub fn to_record(&self) -> RawRecord {
        let mut builder = RawRecord::builder(self.location_name.trim())
            .maybe("lat", self.lat)
            .maybe("lon", self.lon);

        if let Some(at) = self.observed_at() {
            builder = builder.observed_at(at);
        }

        for (element, column) in ELEMENT_COLUMNS {
            builder = builder.maybe(*column, self.element(element));
        }

        builder.build()
    }
}

/// Storm metadata for the active typhoon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TyphoonProfile {
    /// Whether today is already a day off
    #[serde(default)]
    pub dayoff: Option<f64>,
    /// Central pressure (hPa)
    #[serde(default)]
    pub hpa: Option<f64>,
    /// Maximum sustained wind speed (m/s)
    #[serde(default)]
    pub tyws: Option<f64>,
    #[serde(default)]
    pub x7_radius: Option<f64>,
    #[serde(default)]
    pub x10_radius: Option<f64>,
    #[serde(default)]
    pub alert_num: Option<f64>,
    #[serde(default)]
    pub born_spot_e: Option<f64>,
    #[serde(default)]
    pub born_spot_n: Option<f64>,
    #[serde(default)]
    pub route: Option<String>,
}

impl TyphoonProfile {
    /// Typhoon Morakot (2009), used as the default demo storm
    ///
    /// The route is left unset on purpose, so observation requests carry
    /// all-zero `route_--`/`route_2`/`route_3` flags. Setting all three to
    /// 1.0 at once would describe no real track, and one-hot columns must
    /// never be multi-hot.
    pub fn morakot() -> Self {
        Self {
            dayoff: Some(1.0),
            hpa: Some(955.0),
            tyws: Some(40.0),
            x7_radius: Some(250.0),
            x10_radius: Some(100.0),
            alert_num: Some(36.0),
            born_spot_e: Some(136.0),
            born_spot_n: Some(21.0),
            route: None,
        }
    }

    fn columns(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("Dayoff", self.dayoff),
            ("hpa", self.hpa),
            ("TyWS", self.tyws),
            ("X7_radius", self.x7_radius),
            ("X10_radius", self.x10_radius),
            ("alert_num", self.alert_num),
            ("born_spotE", self.born_spot_e),
            ("born_spotN", self.born_spot_n),
        ]
    }

    /// Fill storm metadata the record lacks; upstream values always win
    pub fn apply(&self, record: &RawRecord) -> RawRecord {
        let mut builder = record.to_builder();
        for (column, value) in self.columns() {
            if value.is_some() {
                builder = builder.fill(column, value);
            }
        }
        builder.fill_route(self.route.as_deref()).build()
    }
}
