//! Typhoon day-off predictor CLI
//!
//! Fits transform artifacts from a training table, prints the feature
//! contract, and submits records or station observations to a running
//! prediction service.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use commands::{contract, fit, health, predict};
use dayoff_core::pipeline::NeighborWeights;
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Typhoon day-off predictor CLI
#[derive(Parser)]
#[command(name = "dayoff")]
#[command(author, version, about = "CLI for the Typhoon Day-off Predictor", long_about = None)]
pub struct Cli {
    /// Prediction service URL (can also be set via DAYOFF_API_URL env var)
    #[arg(long, env = "DAYOFF_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the feature contract
    Contract {
        /// Ask the running service instead of this build
        #[arg(long)]
        remote: bool,
    },

    /// Fit the imputer and scaler from a training CSV
    Fit {
        /// Training table (.csv)
        #[arg(long)]
        data: PathBuf,

        /// Label column
        #[arg(long, default_value = dayoff_core::fit::DEFAULT_LABEL)]
        label: String,

        /// Directory receiving the artifact files
        #[arg(long, short, default_value = dayoff_core::artifacts::DEFAULT_ARTIFACT_DIR)]
        output_dir: PathBuf,

        /// Neighbors used by the imputer
        #[arg(long, default_value_t = dayoff_core::pipeline::DEFAULT_NEIGHBORS)]
        neighbors: usize,

        /// Neighbor weighting (uniform, distance)
        #[arg(long, default_value = "distance", value_parser = parse_weights)]
        weights: NeighborWeights,

        /// Seed recorded for classifier training
        #[arg(long, default_value_t = dayoff_core::fit::DEFAULT_SEED)]
        seed: u64,
    },

    /// Request a day-off probability from the service
    #[command(group(ArgGroup::new("input").required(true).args(["record", "observation"])))]
    Predict {
        /// JSON file holding a raw record
        #[arg(long)]
        record: Option<PathBuf>,

        /// JSON file holding a station observation
        #[arg(long)]
        observation: Option<PathBuf>,
    },

    /// Show service health and readiness
    Health,
}

fn parse_weights(value: &str) -> Result<NeighborWeights, String> {
    match value.to_lowercase().as_str() {
        "uniform" => Ok(NeighborWeights::Uniform),
        "distance" => Ok(NeighborWeights::Distance),
        other => Err(format!("unknown weighting '{}' (expected uniform or distance)", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| settings.output_format())
        .unwrap_or_default();
    let api_url = cli
        .api_url
        .or(settings.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    match cli.command {
        Commands::Contract { remote } => {
            if remote {
                let client = client::ApiClient::new(&api_url)?;
                contract::show_remote_contract(&client, format).await?;
            } else {
                contract::show_contract(format)?;
            }
        }
        Commands::Fit {
            data,
            label,
            output_dir,
            neighbors,
            weights,
            seed,
        } => {
            let options = dayoff_core::fit::FitOptions {
                neighbors,
                weights,
                seed,
            };
            fit::fit_artifacts(&data, &label, &output_dir, &options, format)?;
        }
        Commands::Predict { record, observation } => {
            let client = client::ApiClient::new(&api_url)?;
            match (record, observation) {
                (Some(path), _) => predict::predict_record(&client, &path, format).await?,
                (None, Some(path)) => predict::predict_observation(&client, &path, format).await?,
                (None, None) => anyhow::bail!("either --record or --observation is required"),
            }
        }
        Commands::Health => {
            let client = client::ApiClient::new(&api_url)?;
            health::show_health(&client, format).await?;
        }
    }

    Ok(())
}
