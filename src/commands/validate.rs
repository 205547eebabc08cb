//! Validate command implementation

use anyhow::Result;
use itertools::Itertools;
use std::path::PathBuf;
use tracing::info;

use super::load_inputs;

pub fn run(config_path: String, transactions: Vec<PathBuf>) -> Result<()> {
    info!("Validating transaction files");

    // Loading already rejects malformed rows
    let (config, transactions) = load_inputs(&config_path, transactions)?;
    let calculator = config.calculator()?;

    // A dry run surfaces lot shortfalls and skipped rows
    let summary = calculator.calculate(&transactions);

    let per_asset = transactions
        .iter()
        .counts_by(|tx| tx.asset.clone())
        .into_iter()
        .sorted()
        .collect_vec();

    println!("\n{}", "=".repeat(60));
    println!("VALIDATION RESULTS");
    println!("{}", "=".repeat(60));
    println!("Files:              {}", config.data.transactions.len());
    println!("Transactions:       {}", transactions.len());
    if let (Some(first), Some(last)) = (
        transactions.iter().map(|tx| tx.timestamp).min(),
        transactions.iter().map(|tx| tx.timestamp).max(),
    ) {
        println!(
            "Period:             {} to {}",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        );
    }
    for (asset, count) in &per_asset {
        println!("  {:<16}  {}", asset.as_str(), count);
    }
    println!("Warnings:           {}", summary.warnings.len());
    for warning in &summary.warnings {
        println!("  - {}", warning);
    }
    println!("{}", "=".repeat(60));

    if summary.warnings.is_empty() {
        info!("Validation passed");
    } else {
        info!("Validation finished with {} warning(s)", summary.warnings.len());
    }

    Ok(())
}
