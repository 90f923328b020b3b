//! Service configuration

use anyhow::{Context, Result};
use dayoff_core::{ArtifactPaths, TyphoonProfile};
use serde::Deserialize;
use std::path::PathBuf;

/// Names a TOML file layered under the environment
pub const CONFIG_FILE_ENV: &str = "DAYOFF_CONFIG";

const ENV_PREFIX: &str = "DAYOFF";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name attached to structured log events
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Port for the inference, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_imputer_path")]
    pub imputer_path: PathBuf,

    #[serde(default = "default_scaler_path")]
    pub scaler_path: PathBuf,

    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Storm metadata applied to observation requests
    #[serde(default = "TyphoonProfile::morakot")]
    pub typhoon: TyphoonProfile,
}

fn default_service_name() -> String {
    "dayoff-server".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_imputer_path() -> PathBuf {
    ArtifactPaths::from_env().imputer
}

fn default_scaler_path() -> PathBuf {
    ArtifactPaths::from_env().scaler
}

fn default_model_path() -> PathBuf {
    ArtifactPaths::from_env().classifier
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let paths = ArtifactPaths::from_env();
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            imputer_path: paths.imputer,
            scaler_path: paths.scaler,
            model_path: paths.classifier,
            typhoon: TyphoonProfile::morakot(),
        }
    }
}

impl ServiceConfig {
    /// Load from the optional `DAYOFF_CONFIG` file, then `DAYOFF_*` variables
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file)
    }

    pub fn load_from(file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| match &file {
                Some(path) => format!("Failed to read configuration from {}", path.display()),
                None => "Failed to read configuration from environment".to_string(),
            })?;

        config
            .try_deserialize()
            .context("Invalid service configuration")
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            imputer: self.imputer_path.clone(),
            scaler: self.scaler_path.clone(),
            classifier: self.model_path.clone(),
        }
    }
}
