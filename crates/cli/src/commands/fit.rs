//! Artifact fitting CLI command

use anyhow::{Context, Result};
use colored::Colorize;
use dayoff_core::fit::{fit_transforms, write_artifacts, FitOptions, TrainingFrame};
use dayoff_core::ArtifactMetadata;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_info, print_json, print_success, print_table, OutputFormat};

/// Row for the written-files table
#[derive(Tabled, Serialize)]
struct ArtifactRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "SHA-256")]
    checksum: String,
}

fn artifact_rows(metadata: &ArtifactMetadata) -> Vec<ArtifactRow> {
    metadata
        .checksums
        .iter()
        .map(|(file, checksum)| ArtifactRow {
            file: file.clone(),
            checksum: checksum.chars().take(16).collect(),
        })
        .collect()
}

/// Fit the imputer and scaler from a training CSV and write them to `output_dir`
pub fn fit_artifacts(
    data: &Path,
    label: &str,
    output_dir: &Path,
    options: &FitOptions,
    format: OutputFormat,
) -> Result<()> {
    let frame = TrainingFrame::from_csv(data, label)
        .with_context(|| format!("Failed to load training table {}", data.display()))?;
    let fitted = fit_transforms(&frame, options).context("Failed to fit transforms")?;
    let metadata = write_artifacts(output_dir, &fitted)
        .with_context(|| format!("Failed to write artifacts to {}", output_dir.display()))?;

    match format {
        OutputFormat::Json => print_json(&metadata)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Fitted transforms from {} rows ({} positive)",
                metadata.training_rows, metadata.positive_rows
            ));
            println!("Contract:  {}", metadata.contract_version.cyan());
            println!("Label:     {}", metadata.label.cyan());
            println!("Neighbors: {}", options.neighbors);
            println!("Output:    {}", output_dir.display().to_string().cyan());
            println!();
            print_table(&artifact_rows(&metadata), format);
            print_info("Train the classifier on the scaled columns in contract order");
        }
    }

    Ok(())
}
