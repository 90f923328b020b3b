//! HTTP API for inference, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dayoff_core::{
    health::{ComponentStatus, HealthRegistry},
    Pipeline, PipelineError, PredictionResult, RawRecord, StationObservation, TyphoonProfile,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub pipeline: Arc<Pipeline>,
    /// Storm metadata applied to observation requests
    pub typhoon: TyphoonProfile,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        pipeline: Arc<Pipeline>,
        typhoon: TyphoonProfile,
    ) -> Self {
        Self {
            health_registry,
            pipeline,
            typhoon,
        }
    }
}

/// Error payload returned by the prediction endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub error: String,
}

/// Feature contract as served to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractResponse {
    pub version: String,
    pub impute_columns: Vec<String>,
    pub scale_columns: Vec<String>,
    pub classifier: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                kind: kind.to_string(),
                error: message.into(),
            },
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::ContractViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::ShapeMismatch { .. }
            | PipelineError::ArtifactLoadFailure { .. }
            | PipelineError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once artifacts are loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn contract(State(state): State<Arc<AppState>>) -> Json<ContractResponse> {
    let contract = state.pipeline.contract();
    Json(ContractResponse {
        version: contract.version().to_string(),
        impute_columns: contract.impute_columns().iter().map(|c| c.to_string()).collect(),
        scale_columns: contract.scale_columns().iter().map(|c| c.to_string()).collect(),
        classifier: state.pipeline.describe_classifier(),
    })
}

async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RawRecord>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let Json(record) = payload?;
    run_inference(&state, record).await
}

async fn predict_observation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StationObservation>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let Json(observation) = payload?;
    let record = state.typhoon.apply(&observation.to_record());
    run_inference(&state, record).await
}

/// Run the CPU-bound pipeline off the async workers and record the outcome
/// against pipeline health
async fn run_inference(
    state: &AppState,
    record: RawRecord,
) -> Result<Json<PredictionResult>, ApiError> {
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = match tokio::task::spawn_blocking(move || pipeline.infer(&record)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Inference task failed");
            state
                .health_registry
                .record_inference_failure("inference", "inference task aborted")
                .await;
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "inference",
                "inference task aborted",
            ));
        }
    };

    match outcome {
        Ok(result) => {
            state.health_registry.record_inference_success().await;
            Ok(Json(result))
        }
        Err(err @ PipelineError::ContractViolation(_)) => Err(err.into()),
        Err(err) => {
            state
                .health_registry
                .record_inference_failure(err.kind(), &err.to_string())
                .await;
            Err(err.into())
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/contract", get(contract))
        .route("/v1/predict", post(predict))
        .route("/v1/predict/observation", post(predict_observation))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
