//! Feature contract CLI commands

use anyhow::Result;
use colored::Colorize;
use dayoff_core::FeatureContract;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, ContractInfo};
use crate::output::{print_json, print_table, OutputFormat};

/// Row for the contract table
#[derive(Tabled, Serialize)]
struct ColumnRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Imputed")]
    imputed: String,
}

fn column_rows(impute_columns: &[String], scale_columns: &[String]) -> Vec<ColumnRow> {
    scale_columns
        .iter()
        .enumerate()
        .map(|(position, column)| ColumnRow {
            position,
            column: column.clone(),
            imputed: if impute_columns.contains(column) {
                "yes".to_string()
            } else {
                "-".to_string()
            },
        })
        .collect()
}

fn contract_info(contract: &FeatureContract) -> ContractInfo {
    ContractInfo {
        version: contract.version().to_string(),
        impute_columns: contract.impute_columns().iter().map(|c| c.to_string()).collect(),
        scale_columns: contract.scale_columns().iter().map(|c| c.to_string()).collect(),
        classifier: None,
    }
}

fn print_contract(info: &ContractInfo, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(info)?,
        OutputFormat::Table => {
            println!("{}", "Feature Contract".bold());
            println!("{}", "=".repeat(40));
            println!("Version:    {}", info.version.cyan());
            if let Some(classifier) = &info.classifier {
                println!("Classifier: {}", classifier.cyan());
            }
            println!(
                "Columns:    {} imputed, {} scaled",
                info.impute_columns.len(),
                info.scale_columns.len()
            );
            println!();
            print_table(&column_rows(&info.impute_columns, &info.scale_columns), format);
        }
    }
    Ok(())
}

/// Show the contract compiled into this build
pub fn show_contract(format: OutputFormat) -> Result<()> {
    print_contract(&contract_info(&FeatureContract::current()), format)
}

/// Show the contract of the running service
pub async fn show_remote_contract(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let remote: ContractInfo = client.get("v1/contract").await?;
    let local = contract_info(&FeatureContract::current());
    print_contract(&remote, format)?;

    if remote.version != local.version || remote.scale_columns != local.scale_columns {
        crate::output::print_warning(&format!(
            "Service contract {} differs from this build ({})",
            remote.version, local.version
        ));
    }
    Ok(())
}
