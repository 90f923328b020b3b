//! Observability for the prediction service
//!
//! Provides:
//! - Prometheus metrics (inference latency, prediction counts, errors by kind, artifact info)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    inference_latency_seconds: Histogram,
    predictions_total: IntCounter,
    prediction_errors_total: IntCounterVec,
    imputed_values_total: IntCounter,
    artifact_info: GaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            inference_latency_seconds: register_histogram!(
                "dayoff_inference_latency_seconds",
                "Time spent running one record through the pipeline",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            predictions_total: register_int_counter!(
                "dayoff_predictions_total",
                "Total number of successful predictions"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter_vec!(
                "dayoff_prediction_errors_total",
                "Total number of failed predictions by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            imputed_values_total: register_int_counter!(
                "dayoff_imputed_values_total",
                "Total number of feature values filled by the imputer"
            )
            .expect("Failed to register imputed_values_total"),

            artifact_info: register_gauge_vec!(
                "dayoff_artifact_info",
                "Information about the loaded pipeline artifacts",
                &["contract_version", "classifier"]
            )
            .expect("Failed to register artifact_info"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions_total.inc();
    }

    /// Count a failed prediction under its error kind
    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn add_imputed_values(&self, count: usize) {
        self.inner().imputed_values_total.inc_by(count as u64);
    }

    pub fn set_artifact_info(&self, contract_version: &str, classifier: &str) {
        self.inner().artifact_info.reset();
        self.inner()
            .artifact_info
            .with_label_values(&[contract_version, classifier])
            .set(1.0);
    }

    pub fn predictions(&self) -> u64 {
        self.inner().predictions_total.get()
    }

    pub fn prediction_errors(&self, kind: &str) -> u64 {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[kind])
            .get()
    }
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn log_prediction(
        &self,
        station: &str,
        probability: f64,
        imputed_columns: &[String],
        elapsed_ms: f64,
    ) {
        info!(
            event = "prediction_completed",
            service = %self.service,
            station = %station,
            probability = probability,
            imputed = imputed_columns.len(),
            imputed_columns = ?imputed_columns,
            elapsed_ms = elapsed_ms,
            "Day-off probability computed"
        );
    }

    pub fn log_contract_violation(&self, station: &str, details: &str) {
        warn!(
            event = "contract_violation",
            service = %self.service,
            station = %station,
            details = %details,
            "Record rejected by feature contract"
        );
    }

    pub fn log_prediction_failure(&self, station: &str, kind: &str, details: &str) {
        error!(
            event = "prediction_failed",
            service = %self.service,
            station = %station,
            kind = %kind,
            details = %details,
            "Prediction failed"
        );
    }

    pub fn log_imputation(&self, station: &str, column: &str, value: f64) {
        debug!(
            event = "value_imputed",
            service = %self.service,
            station = %station,
            column = %column,
            value = value,
            "Missing value imputed"
        );
    }

    pub fn log_artifacts_loaded(&self, contract_version: &str, classifier: &str, neighbors: usize) {
        info!(
            event = "artifacts_loaded",
            service = %self.service,
            contract_version = %contract_version,
            classifier = %classifier,
            neighbors = neighbors,
            "Pipeline artifacts loaded"
        );
    }

    pub fn log_artifact_failure(&self, details: &str) {
        error!(
            event = "artifact_load_failed",
            service = %self.service,
            details = %details,
            "Pipeline artifacts failed to load"
        );
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            port = port,
            "Day-off prediction service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Day-off prediction service shutting down"
        );
    }
}
