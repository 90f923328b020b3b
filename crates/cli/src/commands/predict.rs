//! Prediction CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use dayoff_core::observation::ObservationResponse;
use dayoff_core::{PredictionResult, RawRecord, StationObservation};
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::client::ApiClient;
use crate::output::{color_probability, print_json, print_warning, OutputFormat, ProbabilityBand};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Submit a raw record from a JSON file
pub async fn predict_record(client: &ApiClient, path: &Path, format: OutputFormat) -> Result<()> {
    let record: RawRecord = read_json(path)?;
    let result: PredictionResult = client.post("v1/predict", &record).await?;
    print_prediction(&result, format)
}

/// Accept either a single station entry or a full dataset response
fn parse_observation(value: serde_json::Value) -> Result<StationObservation> {
    if value.get("records").is_some() {
        let response: ObservationResponse = serde_json::from_value(value)?;
        return response
            .into_first()
            .context("Dataset response contains no station");
    }
    Ok(serde_json::from_value(value)?)
}

/// Submit a station observation from a JSON file; the service adds storm metadata
pub async fn predict_observation(
    client: &ApiClient,
    path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let observation = parse_observation(read_json(path)?)
        .with_context(|| format!("Failed to parse observation {}", path.display()))?;
    let result: PredictionResult = client.post("v1/predict/observation", &observation).await?;
    print_prediction(&result, format)
}

fn print_prediction(result: &PredictionResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result)?,
        OutputFormat::Table => {
            let band = ProbabilityBand::from_probability(result.probability);

            println!("{}", "Day-off Prediction".bold());
            println!("{}", "=".repeat(40));
            println!("Station:     {}", result.station.cyan());
            if let Some(at) = result.observed_at {
                println!("Observed:    {}", at.to_rfc3339());
            }
            println!(
                "Probability: {} ({})",
                color_probability(result.probability),
                band.colorize(band.label())
            );
            println!();
            println!("{}", band.message());

            if !result.imputed_columns.is_empty() {
                println!();
                print_warning(&format!("Imputed: {}", result.imputed_columns.join(", ")));
            }
            println!();
            println!(
                "{}",
                format!("{} / {}", result.contract_version, result.classifier).dimmed()
            );
        }
    }
    Ok(())
}
