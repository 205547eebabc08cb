//! Yearly tax breakdown and console rendering
//!
//! Breaks a [`TaxSummary`] down into per-year totals, split by holding
//! period, and renders them as a table.

use std::collections::BTreeMap;

use crate::method::QuoteCurrency;
use crate::summary::{TaxSummary, Totals};
use crate::Money;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Per-year breakdown of a summary
pub struct YearlyBreakdown {
    currency: QuoteCurrency,
    years: BTreeMap<i32, Totals>,
}

impl YearlyBreakdown {
    pub fn from_summary(summary: &TaxSummary) -> Self {
        let mut years: BTreeMap<i32, Totals> = BTreeMap::new();
        for event in &summary.taxable_events {
            years.entry(event.year()).or_default().add(event);
        }

        Self {
            currency: summary.quote_currency,
            years,
        }
    }

    pub fn years(&self) -> Vec<i32> {
        self.years.keys().copied().collect()
    }

    pub fn get(&self, year: i32) -> Option<&Totals> {
        self.years.get(&year)
    }

    pub fn total_net(&self) -> Money {
        self.years.values().map(Totals::net).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Render the breakdown as a formatted table
    pub fn render(&self) -> String {
        if self.years.is_empty() {
            return "No taxable events to display.".to_string();
        }

        let sym = self.currency.symbol();
        let mut output = String::new();

        output.push_str(&format!("\n{}\n", "=".repeat(118)));
        output.push_str(&format!(
            "{}YEARLY TAX BREAKDOWN ({}){}\n",
            BOLD, self.currency, RESET
        ));
        output.push_str(&format!("{}\n", "=".repeat(118)));

        output.push_str(&format!(
            "{}{:>6} │ {:>6} │ {:>14} │ {:>14} │ {:>12} │ {:>12} │ {:>12} │ {:>12} │ {:>14}{}\n",
            BOLD,
            "Year",
            "Events",
            "Proceeds",
            "Cost Basis",
            "ST Gains",
            "LT Gains",
            "ST Losses",
            "LT Losses",
            "Net",
            RESET
        ));
        output.push_str(&format!("{}\n", "-".repeat(118)));

        for (year, totals) in &self.years {
            output.push_str(&format!(
                "{:>6} │ {:>6} │ {:>14} │ {:>14} │ {:>12} │ {:>12} │ {:>12} │ {:>12} │ {}\n",
                year,
                totals.events,
                format_amount(totals.proceeds),
                format_amount(totals.cost_basis),
                format_amount(totals.short_term_gains),
                format_amount(totals.long_term_gains),
                format_amount(totals.short_term_losses),
                format_amount(totals.long_term_losses),
                colored_cell(totals.net(), 14),
            ));
        }

        output.push_str(&format!("{}\n", "=".repeat(118)));

        let total = self.total_net();
        let color = if total.is_negative() { RED } else { GREEN };
        output.push_str(&format!(
            "{}Net gain/loss: {}{}{}{}\n",
            BOLD,
            color,
            sym,
            format_amount(total),
            RESET
        ));

        let profitable = self.years.values().filter(|t| !t.net().is_negative()).count();
        output.push_str(&format!(
            "{}Years: {} ({} net positive / {} net negative){}\n",
            BOLD,
            self.years.len(),
            profitable,
            self.years.len() - profitable,
            RESET
        ));
        output.push_str(&format!("{}\n", "=".repeat(118)));

        output
    }
}

/// Two decimal places, for display only
pub fn format_amount(value: Money) -> String {
    format!("{:.2}", value.round_dp(2).inner())
}

fn colored_cell(value: Money, width: usize) -> String {
    let color = if value.is_negative() { RED } else { GREEN };
    format!("{}{:>width$}{}", color, format_amount(value), RESET, width = width)
}
