//! Calculate command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crypto_tax::report::{self, TaxReport};
use crypto_tax::yearly::{format_amount, YearlyBreakdown};
use crypto_tax::{TaxCalculator, TaxSummary};

use super::load_inputs;

pub struct CalculateArgs {
    pub config_path: String,
    pub transactions: Vec<PathBuf>,
    pub method: Option<String>,
    pub currency: Option<String>,
    pub year: Option<i32>,
    pub output: Option<PathBuf>,
    pub show_holdings: bool,
}

pub fn run(args: CalculateArgs) -> Result<()> {
    info!("Starting tax calculation");

    let (mut config, transactions) = load_inputs(&args.config_path, args.transactions)?;

    // Apply overrides
    if let Some(method) = args.method {
        info!("Overriding method to: {}", method);
        config.tax.method = method.parse().context("Invalid --method")?;
    }

    if let Some(currency) = args.currency {
        info!("Overriding quote currency to: {}", currency);
        config.tax.quote_currency = currency.parse().context("Invalid --currency")?;
    }

    if let Some(output) = args.output {
        info!("Overriding results dir to: {}", output.display());
        config.data.results_dir = output;
    }

    let calculator: TaxCalculator = config.calculator()?;
    let full = calculator.calculate(&transactions);

    let summary = match args.year {
        Some(year) => {
            info!("Restricting output to tax year {}", year);
            full.for_year(year)
        }
        None => full,
    };

    print_summary(&summary, args.year);
    println!("{}", YearlyBreakdown::from_summary(&summary).render());

    if args.show_holdings {
        print_holdings(&summary);
    }

    let report = TaxReport::new(&transactions, summary)?;
    let (csv_path, json_path) = report::export_all(&report, &config.data.results_dir, args.year)?;
    println!("Events exported to:  {}", csv_path.display());
    println!("Report exported to:  {}", json_path.display());

    info!("Tax calculation completed successfully");

    Ok(())
}

fn print_summary(summary: &TaxSummary, year: Option<i32>) {
    let sym = summary.quote_currency.symbol();
    let title = match year {
        Some(y) => format!("TAX SUMMARY {} ({})", y, summary.method),
        None => format!("TAX SUMMARY ({})", summary.method),
    };

    println!("\n{}", "=".repeat(60));
    println!("{}", title);
    println!("{}", "=".repeat(60));
    println!("Taxable Events:     {}", summary.taxable_events.len());
    println!("Total Proceeds:     {}{}", sym, format_amount(summary.total_proceeds));
    println!("Total Cost Basis:   {}{}", sym, format_amount(summary.total_cost_basis));
    println!("Short-term Gains:   {}{}", sym, format_amount(summary.short_term_gains));
    println!("Long-term Gains:    {}{}", sym, format_amount(summary.long_term_gains));
    println!("Short-term Losses:  {}{}", sym, format_amount(summary.short_term_losses));
    println!("Long-term Losses:   {}{}", sym, format_amount(summary.long_term_losses));
    println!("Total Gains:        {}{}", sym, format_amount(summary.total_gains));
    println!("Total Losses:       {}{}", sym, format_amount(summary.total_losses));
    println!("Net Gain/Loss:      {}{}", sym, format_amount(summary.net_gain_or_loss));
    if !summary.zero_basis_quantity().is_zero() {
        println!("Zero-basis Qty:     {}", summary.zero_basis_quantity().normalize());
    }
    println!("Warnings:           {}", summary.warnings.len());
    println!("{}", "=".repeat(60));
}

fn print_holdings(summary: &TaxSummary) {
    let sym = summary.quote_currency.symbol();

    println!("\n{}", "=".repeat(80));
    println!("OPEN HOLDINGS");
    println!("{}", "=".repeat(80));

    if summary.holdings.is_empty() {
        println!("No open positions.");
        println!("{}", "=".repeat(80));
        return;
    }

    println!(
        "{:<10} {:>18} {:>16} {:>14} {:>5}  {}",
        "Asset", "Quantity", "Cost Basis", "Avg Cost", "Lots", "Held Since"
    );
    println!("{}", "-".repeat(80));
    for holding in &summary.holdings {
        println!(
            "{:<10} {:>18} {:>16} {:>14} {:>5}  {}",
            holding.asset,
            holding.quantity.normalize(),
            format!("{}{}", sym, format_amount(holding.cost_basis)),
            format!("{}{}", sym, format_amount(holding.average_cost)),
            holding.open_lots,
            holding
                .earliest_acquisition
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    println!("{}", "=".repeat(80));
}
