//! Report exports
//!
//! Exporters only read a [`TaxSummary`]; they never recompute anything. The
//! JSON report carries a fingerprint of the input so an export can be tied
//! back to the exact transaction set it was computed from.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::calculator::sort_chronologically;
use crate::method::{CalculationMethod, QuoteCurrency};
use crate::summary::TaxSummary;
use crate::yearly::format_amount;
use crate::Transaction;

/// Provenance of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub method: CalculationMethod,
    pub quote_currency: QuoteCurrency,
    pub transaction_count: usize,
    /// SHA-256 of the chronologically ordered input
    pub input_fingerprint: String,
}

/// Full exportable report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxReport {
    pub metadata: ReportMetadata,
    pub summary: TaxSummary,
}

impl TaxReport {
    pub fn new(transactions: &[Transaction], summary: TaxSummary) -> Result<Self> {
        Ok(Self {
            metadata: ReportMetadata {
                method: summary.method,
                quote_currency: summary.quote_currency,
                transaction_count: transactions.len(),
                input_fingerprint: input_fingerprint(transactions)?,
            },
            summary,
        })
    }
}

/// Hex SHA-256 over the canonical JSON of the timestamp-sorted transactions
pub fn input_fingerprint(transactions: &[Transaction]) -> Result<String> {
    let mut hasher = Sha256::new();
    for tx in sort_chronologically(transactions) {
        let line = serde_json::to_vec(tx).context("Failed to serialize transaction")?;
        hasher.update(&line);
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// One CSV line per taxable event
#[derive(Debug, Serialize)]
struct EventRow<'a> {
    year: i32,
    date: String,
    asset: &'a str,
    quantity: String,
    acquired: String,
    term: &'static str,
    proceeds: String,
    cost_basis: String,
    gain_or_loss: String,
    zero_basis_quantity: String,
    currency: &'static str,
    method: &'static str,
    transaction_hash: &'a str,
    network: &'a str,
}

/// Write taxable events as CSV
pub fn write_events_csv(summary: &TaxSummary, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for event in &summary.taxable_events {
        writer
            .serialize(EventRow {
                year: event.year(),
                date: event.date.to_rfc3339(),
                asset: event.asset.as_str(),
                quantity: event.quantity.normalize().to_string(),
                acquired: event
                    .acquired_at
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default(),
                term: event.term_label(),
                proceeds: format_amount(event.proceeds),
                cost_basis: format_amount(event.acquisition_cost),
                gain_or_loss: format_amount(event.gain_or_loss),
                zero_basis_quantity: event.zero_basis_quantity.normalize().to_string(),
                currency: summary.quote_currency.code(),
                method: summary.method.as_str(),
                transaction_hash: &event.transaction.hash,
                network: &event.transaction.network,
            })
            .context("Failed to write event row")?;
    }

    writer.flush().context("Failed to flush CSV writer")?;
    info!(
        "Wrote {} taxable events to {}",
        summary.taxable_events.len(),
        path.display()
    );
    Ok(())
}

/// Write the full report as pretty JSON
pub fn write_summary_json(report: &TaxReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote report to {}", path.display());
    Ok(())
}

/// Export both files into `dir`, returning their paths
///
/// File names carry the method and, when given, the year:
/// `taxable_events_fifo_2024.csv`, `tax_report_fifo_2024.json`.
pub fn export_all(
    report: &TaxReport,
    dir: impl AsRef<Path>,
    year: Option<i32>,
) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create results dir {}", dir.display()))?;

    let suffix = match year {
        Some(y) => format!("{}_{}", report.metadata.method.as_str().to_lowercase(), y),
        None => report.metadata.method.as_str().to_lowercase(),
    };
    let csv_path = dir.join(format!("taxable_events_{}.csv", suffix));
    let json_path = dir.join(format!("tax_report_{}.json", suffix));

    write_events_csv(&report.summary, &csv_path)?;
    write_summary_json(report, &json_path)?;

    Ok((csv_path, json_path))
}
