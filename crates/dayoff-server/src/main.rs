//! Day-off prediction service
//!
//! Loads the fitted artifacts once, then serves inference, health and
//! metrics over HTTP. A failed artifact load stops the process before the
//! listener binds.

use anyhow::{Context, Result};
use dayoff_core::{
    health::HealthRegistry,
    observability::StructuredLogger,
    ArtifactSet, Pipeline,
};
use dayoff_server::{api, config::ServiceConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting dayoff-server");

    let config = ServiceConfig::load()?;
    let paths = config.artifact_paths();
    info!(
        port = config.api_port,
        imputer = %paths.imputer.display(),
        scaler = %paths.scaler.display(),
        model = %paths.classifier.display(),
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    let logger = StructuredLogger::new(&config.service_name);

    let artifacts = match ArtifactSet::load(&paths) {
        Ok(artifacts) => artifacts,
        Err(e) => {
            logger.log_artifact_failure(&e.to_string());
            return Err(e).context("Refusing to serve without a complete artifact set");
        }
    };
    logger.log_artifacts_loaded(
        artifacts.contract.version(),
        &artifacts.describe_classifier(),
        artifacts.imputer.n_neighbors(),
    );
    let artifact_summary = format!(
        "{}, {}",
        artifacts.contract.version(),
        artifacts.describe_classifier()
    );

    let pipeline = Arc::new(Pipeline::new(artifacts).with_logger(logger.clone()));
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        pipeline,
        config.typhoon.clone(),
    ));

    health_registry.mark_artifacts_loaded(artifact_summary).await;
    logger.log_startup(SERVICE_VERSION, config.api_port);

    let shutdown_logger = logger.clone();
    api::serve(config.api_port, app_state, async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_logger.log_shutdown("SIGINT received");
        }
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
