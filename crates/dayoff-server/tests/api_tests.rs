//! Integration tests for the prediction service endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use dayoff_core::{
    contract::{FeatureContract, IMPUTE_COLUMNS, SCALE_WIDTH},
    health::{components, HealthRegistry, UNHEALTHY_AFTER_FAILURES},
    pipeline::{KnnImputer, MinMaxScaler, NeighborWeights},
    Classifier, Pipeline, PipelineError, ScaledVector, TyphoonProfile,
};
use dayoff_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Probability equal to the scaled typhoon wind speed, clamped
struct WindSpeedClassifier;

impl Classifier for WindSpeedClassifier {
    fn predict_proba(&self, features: &ScaledVector) -> Result<f64, PipelineError> {
        Ok(features.as_slice()[8].clamp(0.0, 1.0))
    }

    fn describe(&self) -> String {
        "wind-speed".to_string()
    }
}

struct BrokenClassifier;

impl Classifier for BrokenClassifier {
    fn predict_proba(&self, _features: &ScaledVector) -> Result<f64, PipelineError> {
        Err(PipelineError::Inference("tensor shape rejected".to_string()))
    }

    fn describe(&self) -> String {
        "broken".to_string()
    }
}

fn test_pipeline(classifier: Box<dyn Classifier>) -> Pipeline {
    let rows: Vec<Vec<f64>> = (0..5)
        .map(|r| (0..IMPUTE_COLUMNS.len()).map(|c| (r + c) as f64).collect())
        .collect();
    let imputer = KnnImputer::fit(&rows, 3, NeighborWeights::Distance).unwrap();
    let mut max = vec![100.0; SCALE_WIDTH];
    // TyWS spans 0..80 m/s
    max[8] = 80.0;
    let scaler = MinMaxScaler::new(vec![0.0; SCALE_WIDTH], max, false).unwrap();
    Pipeline::from_parts(FeatureContract::current(), imputer, scaler, classifier).unwrap()
}

async fn setup_app_with(classifier: Box<dyn Classifier>) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACTS).await;
    health_registry.register(components::PIPELINE).await;

    let state = Arc::new(AppState::new(
        health_registry,
        Arc::new(test_pipeline(classifier)),
        TyphoonProfile::morakot(),
    ));
    (create_router(state.clone()), state)
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    setup_app_with(Box::new(WindSpeedClassifier)).await
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn complete_record() -> Value {
    json!({
        "station": "Taipei",
        "observed_at": "2024-07-24T06:00:00Z",
        "values": {
            "Precp": 85.5, "RH": 93, "StnHeight": 5.3, "StnPres": 990.2,
            "T.Max": 29.0, "T.Min": 25.1, "Temperature": 26.4,
            "WDGust_vector_x": 2.1, "WDGust_vector_y": -3.3,
            "WD_vector_x": 1.0, "WD_vector_y": -1.4,
            "lat": 25.04, "lon": 121.51,
            "TyWS": 40, "hpa": 955
        },
        "route": "2"
    })
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;
    for _ in 0..UNHEALTHY_AFTER_FAILURES {
        state
            .health_registry
            .record_inference_failure("inference", "Classifier session lost")
            .await;
    }

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_artifact_readiness() {
    let (app, state) = setup_test_app().await;

    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["ready"], false);

    state.health_registry.set_ready(true).await;
    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);
}

#[tokio::test]
async fn test_contract_endpoint() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/v1/contract")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["version"], FeatureContract::current().version());
    assert_eq!(body["impute_columns"].as_array().unwrap().len(), 13);
    assert_eq!(body["scale_columns"].as_array().unwrap().len(), 24);
    assert_eq!(body["scale_columns"][0], "Dayoff");
    assert_eq!(body["classifier"], "wind-speed");
}

#[tokio::test]
async fn test_predict_returns_probability() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(post_json("/v1/predict", complete_record().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["station"], "Taipei");
    assert_eq!(body["probability"], 0.5);
    assert_eq!(body["imputed_columns"].as_array().unwrap().len(), 0);
    assert_eq!(body["observed_at"], "2024-07-24T06:00:00Z");
}

#[tokio::test]
async fn test_predict_imputes_null_values() {
    let (app, _state) = setup_test_app().await;
    let mut record = complete_record();
    record["values"]["RH"] = Value::Null;
    record["values"]["Precp"] = json!("T");

    let response = app
        .oneshot(post_json("/v1/predict", record.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["imputed_columns"], json!(["Precp", "RH"]));
}

#[tokio::test]
async fn test_predict_absent_column_is_422() {
    let (app, _state) = setup_test_app().await;
    let mut record = complete_record();
    record["values"].as_object_mut().unwrap().remove("lon");

    let response = app
        .oneshot(post_json("/v1/predict", record.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["kind"], "contract_violation");
    assert!(body["error"].as_str().unwrap().contains("lon"));
}

#[tokio::test]
async fn test_predict_malformed_json_is_400() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(post_json("/v1/predict", "{\"station\": ".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "bad_request");
}

#[tokio::test]
async fn test_classifier_failure_is_500() {
    let (app, _state) = setup_app_with(Box::new(BrokenClassifier)).await;

    let response = app
        .oneshot(post_json("/v1/predict", complete_record().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["kind"], "inference");
}

#[tokio::test]
async fn test_classifier_failure_degrades_pipeline_health() {
    let (app, state) = setup_app_with(Box::new(BrokenClassifier)).await;
    state.health_registry.set_ready(true).await;

    let response = app
        .clone()
        .oneshot(post_json("/v1/predict", complete_record().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"][components::PIPELINE]["status"], "degraded");
    assert!(body["components"][components::PIPELINE]["message"]
        .as_str()
        .unwrap()
        .contains("tensor shape rejected"));

    // Still serving while degraded
    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_repeated_classifier_failures_fail_readiness() {
    let (app, state) = setup_app_with(Box::new(BrokenClassifier)).await;
    state.health_registry.set_ready(true).await;

    for _ in 0..UNHEALTHY_AFTER_FAILURES {
        let response = app
            .clone()
            .oneshot(post_json("/v1/predict", complete_record().to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let response = app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_contract_violation_leaves_pipeline_healthy() {
    let (app, _state) = setup_test_app().await;
    let mut record = complete_record();
    record["values"].as_object_mut().unwrap().remove("lat");

    let response = app
        .clone()
        .oneshot(post_json("/v1/predict", record.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_predict_observation_applies_typhoon_profile() {
    let (app, _state) = setup_test_app().await;
    let observation = json!({
        "locationName": "基隆",
        "lat": "25.1333",
        "lon": "121.7405",
        "time": {"obsTime": "2009-08-08 09:00:00"},
        "weatherElement": [
            {"elementName": "ELEV", "elementValue": "26.7"},
            {"elementName": "WDIR", "elementValue": "330"},
            {"elementName": "WDSD", "elementValue": "12.4"},
            {"elementName": "TEMP", "elementValue": "27.3"},
            {"elementName": "HUMD", "elementValue": "0.92"},
            {"elementName": "PRES", "elementValue": "993.4"},
            {"elementName": "24R", "elementValue": "210.5"},
            {"elementName": "H_FX", "elementValue": "-99"},
            {"elementName": "H_XD", "elementValue": "-99"},
            {"elementName": "D_TX", "elementValue": "29.8"},
            {"elementName": "D_TN", "elementValue": "25.9"}
        ]
    });

    let response = app
        .oneshot(post_json("/v1/predict/observation", observation.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["station"], "基隆");
    // Morakot's 40 m/s over a 0..80 range
    assert_eq!(body["probability"], 0.5);
    assert_eq!(
        body["imputed_columns"],
        json!(["WDGust_vector_x", "WDGust_vector_y"])
    );
    assert_eq!(body["observed_at"], "2009-08-08T01:00:00Z");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    // Generate at least one prediction so the counters exist
    let response = app
        .clone()
        .oneshot(post_json("/v1/predict", complete_record().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("dayoff_predictions_total"));
    assert!(text.contains("dayoff_inference_latency_seconds"));
    assert!(text.contains("dayoff_artifact_info"));
}
