//! Tax lot accounting engine
//!
//! Turns a batch of transactions into taxable events and a [`TaxSummary`].
//!
//! # Processing
//!
//! 1. Transactions are stable-sorted by timestamp (ties keep input order).
//! 2. Inbound transactions open lots in the asset's book.
//! 3. Outbound transactions are matched against the book using the run's
//!    [`CalculationMethod`]. Quantity the book cannot cover is priced at zero
//!    cost basis and reported as a [`DataQualityWarning`].
//! 4. Swaps dispose the sent asset and then open a lot of the received asset,
//!    both at the transaction's fiat value.
//!
//! A disposal whose consumed lots fall on both sides of the long-term
//! threshold is emitted as two events: the long-term share first, then the
//! short-term share. Proceeds are allocated by quantity.
//!
//! Each call owns all of its state, so runs are independent and may execute
//! in parallel (see [`compare_methods`]).

use chrono::{DateTime, Months, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::error::{TaxError, TaxResult};
use crate::lots::{AssetBook, MatchResult, ALLOCATION_SCALE};
use crate::method::{CalculationMethod, QuoteCurrency};
use crate::summary::{DataQualityWarning, TaxSummary, TaxableEvent};
use crate::{Asset, Direction, Money, Transaction, TransferKind};

/// Default holding period for long-term treatment
pub const DEFAULT_LONG_TERM_MONTHS: u32 = 12;

/// Jurisdiction rules applied on top of the matching method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRules {
    /// Holding period in calendar months after which a disposal is long-term
    pub long_term_months: u32,
}

impl Default for TaxRules {
    fn default() -> Self {
        TaxRules {
            long_term_months: DEFAULT_LONG_TERM_MONTHS,
        }
    }
}

impl TaxRules {
    pub fn validate(&self) -> TaxResult<()> {
        if self.long_term_months == 0 {
            return Err(TaxError::InvalidRule(
                "long_term_months must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether units acquired at `acquired` and disposed at `disposed` are long-term
    pub fn is_long_term(&self, acquired: DateTime<Utc>, disposed: DateTime<Utc>) -> bool {
        acquired
            .checked_add_months(Months::new(self.long_term_months))
            .map(|threshold| threshold <= disposed)
            .unwrap_or(false)
    }
}

/// Configured engine for one method and currency
#[derive(Debug, Clone, Copy)]
pub struct TaxCalculator {
    method: CalculationMethod,
    quote_currency: QuoteCurrency,
    rules: TaxRules,
}

impl TaxCalculator {
    pub fn new(
        method: CalculationMethod,
        quote_currency: QuoteCurrency,
        rules: TaxRules,
    ) -> TaxResult<Self> {
        rules.validate()?;
        Ok(Self {
            method,
            quote_currency,
            rules,
        })
    }

    /// Build a calculator from user-supplied names, e.g. `("hifo", "usd")`
    pub fn from_names(method: &str, quote_currency: &str, rules: TaxRules) -> TaxResult<Self> {
        Self::new(method.parse()?, quote_currency.parse()?, rules)
    }

    pub fn method(&self) -> CalculationMethod {
        self.method
    }

    pub fn quote_currency(&self) -> QuoteCurrency {
        self.quote_currency
    }

    pub fn rules(&self) -> TaxRules {
        self.rules
    }

    /// Compute the full summary for `transactions`
    pub fn calculate(&self, transactions: &[Transaction]) -> TaxSummary {
        let mut run = Run::new(self);

        for tx in sort_chronologically(transactions) {
            run.process(tx);
        }

        let summary = run.finish();
        info!(
            "{} run: {} transactions, {} taxable events, net {} {}, {} warnings",
            self.method,
            transactions.len(),
            summary.taxable_events.len(),
            summary.net_gain_or_loss.round_dp(2),
            self.quote_currency,
            summary.warnings.len()
        );
        summary
    }
}

/// Compute taxes with the default rules
///
/// Empty input yields an empty summary, never an error.
pub fn calculate_taxes(
    transactions: &[Transaction],
    method: CalculationMethod,
    quote_currency: QuoteCurrency,
) -> TaxResult<TaxSummary> {
    let calculator = TaxCalculator::new(method, quote_currency, TaxRules::default())?;
    Ok(calculator.calculate(transactions))
}

/// Run every calculation method over the same input in parallel
///
/// Results come back in [`CalculationMethod::ALL`] order.
pub fn compare_methods(
    transactions: &[Transaction],
    quote_currency: QuoteCurrency,
    rules: TaxRules,
) -> TaxResult<Vec<TaxSummary>> {
    rules.validate()?;
    let summaries = CalculationMethod::ALL
        .par_iter()
        .map(|&method| {
            TaxCalculator::new(method, quote_currency, rules).map(|calc| calc.calculate(transactions))
        })
        .collect::<TaxResult<Vec<_>>>()?;
    Ok(summaries)
}

/// Stable sort by timestamp; equal timestamps keep their input order
pub fn sort_chronologically(transactions: &[Transaction]) -> Vec<&Transaction> {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| tx.timestamp);
    ordered
}

/// Mutable state of a single calculation
struct Run<'a> {
    calculator: &'a TaxCalculator,
    books: HashMap<Asset, AssetBook>,
    events: Vec<TaxableEvent>,
    warnings: Vec<DataQualityWarning>,
}

impl<'a> Run<'a> {
    fn new(calculator: &'a TaxCalculator) -> Self {
        Self {
            calculator,
            books: HashMap::new(),
            events: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn book(&mut self, asset: &Asset) -> &mut AssetBook {
        let method = self.calculator.method;
        self.books
            .entry(asset.clone())
            .or_insert_with(|| AssetBook::new(asset.clone(), method))
    }

    fn warn(&mut self, warning: DataQualityWarning) {
        warn!("Data quality: {}", warning);
        self.warnings.push(warning);
    }

    fn process(&mut self, tx: &Transaction) {
        if !tx.amount.is_positive() {
            self.warn(DataQualityWarning::NonPositiveAmount {
                hash: tx.hash.clone(),
                amount: tx.amount,
            });
            return;
        }

        let swap_kind = matches!(tx.kind, TransferKind::Swap { .. });
        if swap_kind && tx.direction != Direction::Swap {
            self.warn(DataQualityWarning::DirectionKindMismatch {
                hash: tx.hash.clone(),
                direction: tx.direction,
            });
        }

        match tx.direction {
            Direction::Inbound => {
                self.acquire(&tx.asset, tx.amount, tx.value, tx);
            }
            // An outbound row carrying a received leg is still an exchange
            Direction::Outbound if swap_kind => {
                self.swap(tx);
            }
            Direction::Outbound => {
                self.dispose(tx);
            }
            Direction::Swap => {
                self.swap(tx);
            }
        }
    }

    fn swap(&mut self, tx: &Transaction) {
        self.dispose(tx);
        match &tx.kind {
            TransferKind::Swap {
                received_asset,
                received_amount,
            } if received_amount.is_positive() => {
                self.acquire(received_asset, *received_amount, tx.value, tx);
            }
            _ => self.warn(DataQualityWarning::SwapWithoutReceivedLeg {
                hash: tx.hash.clone(),
            }),
        }
    }

    fn acquire(&mut self, asset: &Asset, quantity: Money, total_cost: Money, tx: &Transaction) {
        debug!(
            "Acquire {} {} for {} ({})",
            quantity, asset, total_cost, tx.hash
        );
        self.book(asset)
            .acquire(quantity, total_cost, tx.timestamp, &tx.hash);
    }

    fn dispose(&mut self, tx: &Transaction) {
        let book = self.book(&tx.asset);
        let available = book.total_quantity();
        let matched = book.dispose(tx.amount);

        if matched.shortfall.is_positive() {
            self.warn(DataQualityWarning::InsufficientLots {
                hash: tx.hash.clone(),
                asset: tx.asset.clone(),
                requested: tx.amount,
                available,
            });
        }

        debug!(
            "Dispose {} {} for {} ({}): {} portions, shortfall {}",
            tx.amount,
            tx.asset,
            tx.value,
            tx.hash,
            matched.portions.len(),
            matched.shortfall
        );

        let events = build_events(tx, &matched, &self.calculator.rules);
        self.events.extend(events);
    }

    fn finish(self) -> TaxSummary {
        // BTreeMap so holdings come out sorted by asset
        let holdings = self
            .books
            .into_iter()
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .filter_map(|book| book.holding())
            .collect();

        TaxSummary::from_events(
            self.calculator.method,
            self.calculator.quote_currency,
            self.events,
            holdings,
            self.warnings,
        )
    }
}

/// Quantity and cost of one holding-period class within a disposal
#[derive(Debug, Default)]
struct TermShare {
    quantity: Money,
    cost: Money,
    zero_basis: Money,
    acquired_at: Option<DateTime<Utc>>,
}

impl TermShare {
    fn is_empty(&self) -> bool {
        !self.quantity.is_positive()
    }

    fn note_acquired(&mut self, date: DateTime<Utc>) {
        self.acquired_at = Some(match self.acquired_at {
            Some(existing) => existing.min(date),
            None => date,
        });
    }
}

/// Turn one matched disposal into one or two taxable events
fn build_events(tx: &Transaction, matched: &MatchResult, rules: &TaxRules) -> Vec<TaxableEvent> {
    let mut long = TermShare::default();
    let mut short = TermShare::default();

    for portion in &matched.portions {
        let share = if rules.is_long_term(portion.acquired_at, tx.timestamp) {
            &mut long
        } else {
            &mut short
        };
        share.quantity += portion.quantity;
        share.cost += portion.cost_basis;
        share.note_acquired(portion.acquired_at);
    }

    // Uncovered units have no holding period
    if matched.shortfall.is_positive() {
        short.quantity += matched.shortfall;
        short.zero_basis += matched.shortfall;
    }

    let long_proceeds = if short.is_empty() {
        tx.value
    } else {
        tx.value
            .mul_ratio(long.quantity, tx.amount)
            .round_dp(ALLOCATION_SCALE)
    };
    let short_proceeds = tx.value - long_proceeds;

    let mut events = Vec::with_capacity(2);
    if !long.is_empty() {
        events.push(make_event(tx, long, long_proceeds, true));
    }
    if !short.is_empty() {
        events.push(make_event(tx, short, short_proceeds, false));
    }
    events
}

fn make_event(tx: &Transaction, share: TermShare, proceeds: Money, is_long_term: bool) -> TaxableEvent {
    TaxableEvent {
        date: tx.timestamp,
        asset: tx.asset.clone(),
        quantity: share.quantity,
        acquisition_cost: share.cost,
        proceeds,
        gain_or_loss: proceeds - share.cost,
        is_long_term,
        acquired_at: share.acquired_at,
        zero_basis_quantity: share.zero_basis,
        transaction: tx.clone(),
    }
}
