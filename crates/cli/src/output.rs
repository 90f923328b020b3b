//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// How likely a day off is, by probability range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbabilityBand {
    VeryLikely,
    Likely,
    Possible,
    Uncertain,
    Unlikely,
    VeryUnlikely,
}

impl ProbabilityBand {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.9 {
            Self::VeryLikely
        } else if probability >= 0.8 {
            Self::Likely
        } else if probability >= 0.6 {
            Self::Possible
        } else if probability >= 0.4 {
            Self::Uncertain
        } else if probability >= 0.2 {
            Self::Unlikely
        } else {
            Self::VeryUnlikely
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryLikely => "very likely",
            Self::Likely => "likely",
            Self::Possible => "possible",
            Self::Uncertain => "uncertain",
            Self::Unlikely => "unlikely",
            Self::VeryUnlikely => "very unlikely",
        }
    }

    /// One-line verdict shown under the probability
    pub fn message(&self) -> &'static str {
        match self {
            Self::VeryLikely => "A typhoon day off is almost certain. Enjoy the break!",
            Self::Likely => "A day off is highly likely. Be prepared.",
            Self::Possible => "There is a fair chance of a day off.",
            Self::Uncertain => "Even the forecasters can't call this one.",
            Self::Unlikely => "A day off is unlikely tomorrow.",
            Self::VeryUnlikely => "Don't count on a day off.",
        }
    }

    pub fn colorize(&self, text: &str) -> String {
        match self {
            Self::VeryLikely | Self::Likely => text.green().bold().to_string(),
            Self::Possible => text.green().to_string(),
            Self::Uncertain => text.yellow().to_string(),
            Self::Unlikely | Self::VeryUnlikely => text.red().to_string(),
        }
    }
}

/// Format probability as a percentage with one decimal
pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Color a probability by its band
pub fn color_probability(probability: f64) -> String {
    ProbabilityBand::from_probability(probability).colorize(&format_probability(probability))
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}
