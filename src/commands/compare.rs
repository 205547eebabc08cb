//! Compare command implementation

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use std::path::PathBuf;
use tracing::info;

use crypto_tax::yearly::format_amount;
use crypto_tax::{compare_methods, Money, TaxSummary};

use super::load_inputs;

pub fn run(
    config_path: String,
    transactions: Vec<PathBuf>,
    currency_override: Option<String>,
    sort_by: String,
) -> Result<()> {
    info!("Starting method comparison");

    let (mut config, transactions) = load_inputs(&config_path, transactions)?;

    if let Some(currency) = currency_override {
        info!("Overriding quote currency to: {}", currency);
        config.tax.quote_currency = currency.parse().context("Invalid --currency")?;
    }

    let key = sort_key(&sort_by)?;
    let summaries = compare_methods(&transactions, config.tax.quote_currency, config.tax.rules())
        .context("Method comparison failed")?;
    info!("Compared {} methods, sorted by: {}", summaries.len(), sort_by);

    // Lowest tax burden first; ties keep method order
    let ranked = summaries.iter().sorted_by_key(|s| key(s)).collect_vec();

    let sym = config.tax.quote_currency.symbol();
    println!("\n{}", "=".repeat(100));
    println!("METHOD COMPARISON (sorted by {})", sort_by);
    println!("{}", "=".repeat(100));
    println!(
        "{:<4} {:<6} {:>8} {:>16} {:>16} {:>16} {:>16} {:>8}",
        "Rank", "Method", "Events", "Gains", "Losses", "Long-term", "Net", "Warnings"
    );
    println!("{}", "-".repeat(100));

    for (i, summary) in ranked.iter().enumerate() {
        println!(
            "{:<4} {:<6} {:>8} {:>16} {:>16} {:>16} {:>16} {:>8}",
            i + 1,
            summary.method,
            summary.taxable_events.len(),
            format!("{}{}", sym, format_amount(summary.total_gains)),
            format!("{}{}", sym, format_amount(summary.total_losses)),
            format!(
                "{}{}",
                sym,
                format_amount(summary.long_term_gains - summary.long_term_losses)
            ),
            format!("{}{}", sym, format_amount(summary.net_gain_or_loss)),
            summary.warnings.len(),
        );
    }
    println!("{}", "=".repeat(100));

    if let Some(best) = ranked.first() {
        println!(
            "Best by {}: {} (net {}{})",
            sort_by,
            best.method,
            sym,
            format_amount(best.net_gain_or_loss)
        );
    }

    info!("Method comparison completed successfully");

    Ok(())
}

/// Ranking key; smaller ranks first
fn sort_key(sort_by: &str) -> Result<fn(&TaxSummary) -> Money> {
    let key: fn(&TaxSummary) -> Money = match sort_by {
        "net" => net_key,
        "gains" => gains_key,
        "losses" => losses_key,
        other => bail!("Unknown sort key: {}. Expected net, gains or losses", other),
    };
    Ok(key)
}

fn net_key(summary: &TaxSummary) -> Money {
    summary.net_gain_or_loss
}

fn gains_key(summary: &TaxSummary) -> Money {
    summary.total_gains
}

// Largest harvested loss first
fn losses_key(summary: &TaxSummary) -> Money {
    -summary.total_losses
}
