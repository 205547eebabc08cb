//! Engine output: taxable events, holdings and the aggregate summary

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::method::{CalculationMethod, QuoteCurrency};
use crate::{Asset, Direction, Money, Transaction};

/// One matched disposal (or one holding-period share of it)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxableEvent {
    /// Disposal date
    pub date: DateTime<Utc>,
    pub asset: Asset,
    pub quantity: Money,
    /// Sum of the consumed lots' cost basis
    pub acquisition_cost: Money,
    /// Fiat value realized by this quantity
    pub proceeds: Money,
    /// `proceeds - acquisition_cost`
    pub gain_or_loss: Money,
    pub is_long_term: bool,
    /// Earliest acquisition date among the consumed lots
    pub acquired_at: Option<DateTime<Utc>>,
    /// Quantity priced at zero cost basis because no open lot covered it
    pub zero_basis_quantity: Money,
    /// The disposal this event was computed from
    pub transaction: Transaction,
}

impl TaxableEvent {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn is_gain(&self) -> bool {
        !self.gain_or_loss.is_negative()
    }

    pub fn term_label(&self) -> &'static str {
        if self.is_long_term {
            "long-term"
        } else {
            "short-term"
        }
    }
}

/// Position still open after the last processed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub asset: Asset,
    pub quantity: Money,
    pub cost_basis: Money,
    pub average_cost: Money,
    pub open_lots: usize,
    pub earliest_acquisition: Option<DateTime<Utc>>,
}

/// Recoverable data problems found while computing a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// Disposal larger than the tracked holdings; the excess got zero basis
    InsufficientLots {
        hash: String,
        asset: Asset,
        requested: Money,
        available: Money,
    },
    /// Transaction with zero or negative amount, ignored
    NonPositiveAmount { hash: String, amount: Money },
    /// Swap direction without a received leg, processed as a plain disposal
    SwapWithoutReceivedLeg { hash: String },
    /// Received leg on a row whose direction is not `swap`
    DirectionKindMismatch { hash: String, direction: Direction },
}

impl DataQualityWarning {
    pub fn hash(&self) -> &str {
        match self {
            DataQualityWarning::InsufficientLots { hash, .. }
            | DataQualityWarning::NonPositiveAmount { hash, .. }
            | DataQualityWarning::SwapWithoutReceivedLeg { hash }
            | DataQualityWarning::DirectionKindMismatch { hash, .. } => hash,
        }
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::InsufficientLots {
                hash,
                asset,
                requested,
                available,
            } => write!(
                f,
                "{}: disposed {} {} but only {} tracked; excess {} priced at zero cost basis",
                hash,
                requested,
                asset,
                available,
                *requested - *available
            ),
            DataQualityWarning::NonPositiveAmount { hash, amount } => {
                write!(f, "{}: non-positive amount {} ignored", hash, amount)
            }
            DataQualityWarning::SwapWithoutReceivedLeg { hash } => write!(
                f,
                "{}: swap without received asset, treated as a plain disposal",
                hash
            ),
            DataQualityWarning::DirectionKindMismatch { hash, direction } => write!(
                f,
                "{}: {} row carries a swap leg, processed as {}",
                hash,
                direction,
                match direction {
                    Direction::Inbound => "an acquisition",
                    _ => "a swap",
                }
            ),
        }
    }
}

/// Aggregate result of one engine run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub method: CalculationMethod,
    pub quote_currency: QuoteCurrency,
    /// Events in processing order
    pub taxable_events: Vec<TaxableEvent>,
    /// Derived from `taxable_events`, keyed by disposal year
    pub taxable_events_by_year: BTreeMap<String, Vec<TaxableEvent>>,
    pub total_gains: Money,
    pub total_losses: Money,
    pub long_term_gains: Money,
    pub short_term_gains: Money,
    pub long_term_losses: Money,
    pub short_term_losses: Money,
    pub net_gain_or_loss: Money,
    pub total_proceeds: Money,
    pub total_cost_basis: Money,
    /// Open positions at the end of processing, sorted by asset
    pub holdings: Vec<Holding>,
    pub warnings: Vec<DataQualityWarning>,
}

impl TaxSummary {
    /// Summary with no events and every total at zero
    pub fn empty(method: CalculationMethod, quote_currency: QuoteCurrency) -> Self {
        Self::from_events(method, quote_currency, Vec::new(), Vec::new(), Vec::new())
    }

    /// Build the summary and every derived field from a list of events
    pub fn from_events(
        method: CalculationMethod,
        quote_currency: QuoteCurrency,
        taxable_events: Vec<TaxableEvent>,
        holdings: Vec<Holding>,
        warnings: Vec<DataQualityWarning>,
    ) -> Self {
        let mut summary = TaxSummary {
            method,
            quote_currency,
            taxable_events,
            taxable_events_by_year: BTreeMap::new(),
            total_gains: Money::ZERO,
            total_losses: Money::ZERO,
            long_term_gains: Money::ZERO,
            short_term_gains: Money::ZERO,
            long_term_losses: Money::ZERO,
            short_term_losses: Money::ZERO,
            net_gain_or_loss: Money::ZERO,
            total_proceeds: Money::ZERO,
            total_cost_basis: Money::ZERO,
            holdings,
            warnings,
        };
        summary.recompute_totals();
        summary.rebuild_by_year();
        summary
    }

    fn recompute_totals(&mut self) {
        let mut totals = Totals::default();
        for event in &self.taxable_events {
            totals.add(event);
        }
        self.total_gains = totals.gains();
        self.total_losses = totals.losses();
        self.long_term_gains = totals.long_term_gains;
        self.short_term_gains = totals.short_term_gains;
        self.long_term_losses = totals.long_term_losses;
        self.short_term_losses = totals.short_term_losses;
        self.net_gain_or_loss = totals.net();
        self.total_proceeds = totals.proceeds;
        self.total_cost_basis = totals.cost_basis;
    }

    /// Reconstruct `taxable_events_by_year` from `taxable_events`
    pub fn rebuild_by_year(&mut self) {
        let mut by_year: BTreeMap<String, Vec<TaxableEvent>> = BTreeMap::new();
        for event in &self.taxable_events {
            by_year
                .entry(event.year().to_string())
                .or_default()
                .push(event.clone());
        }
        self.taxable_events_by_year = by_year;
    }

    /// Summary restricted to events disposed in `year`
    ///
    /// Holdings and warnings describe the whole run and are carried over.
    pub fn for_year(&self, year: i32) -> TaxSummary {
        let events = self
            .taxable_events
            .iter()
            .filter(|event| event.year() == year)
            .cloned()
            .collect();
        TaxSummary::from_events(
            self.method,
            self.quote_currency,
            events,
            self.holdings.clone(),
            self.warnings.clone(),
        )
    }

    /// Years with at least one event, ascending
    pub fn years(&self) -> Vec<i32> {
        self.taxable_events_by_year
            .keys()
            .filter_map(|year| year.parse().ok())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.taxable_events.is_empty()
    }

    /// Total quantity disposed without matching lots
    pub fn zero_basis_quantity(&self) -> Money {
        self.taxable_events
            .iter()
            .map(|event| event.zero_basis_quantity)
            .sum()
    }
}

/// Running gain/loss split by holding period
///
/// Feeds both the summary totals and the per-year breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub long_term_gains: Money,
    pub short_term_gains: Money,
    pub long_term_losses: Money,
    pub short_term_losses: Money,
    pub proceeds: Money,
    pub cost_basis: Money,
    pub events: usize,
}

impl Totals {
    pub fn add(&mut self, event: &TaxableEvent) {
        let amount = event.gain_or_loss;
        match (event.is_gain(), event.is_long_term) {
            (true, true) => self.long_term_gains += amount,
            (true, false) => self.short_term_gains += amount,
            (false, true) => self.long_term_losses += amount.abs(),
            (false, false) => self.short_term_losses += amount.abs(),
        }
        self.proceeds += event.proceeds;
        self.cost_basis += event.acquisition_cost;
        self.events += 1;
    }

    pub fn gains(&self) -> Money {
        self.long_term_gains + self.short_term_gains
    }

    pub fn losses(&self) -> Money {
        self.long_term_losses + self.short_term_losses
    }

    pub fn net(&self) -> Money {
        self.gains() - self.losses()
    }
}
