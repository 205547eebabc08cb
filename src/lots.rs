//! Lot books: open acquisitions per asset and the matching of disposals
//!
//! Discrete methods (FIFO, LIFO, HIFO) keep every acquisition as a [`Lot`]
//! and pick the next lot to consume by the method's ordering. WAC keeps a
//! single running average cost per asset; it still keeps a FIFO queue of
//! acquisition dates so holding periods can be classified, but that queue
//! never contributes cost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::VecDeque;
use tracing::debug;

use crate::method::CalculationMethod;
use crate::summary::Holding;
use crate::{Asset, Money};

/// Decimal places kept when a cost or proceeds figure is split pro rata
///
/// The last slice of a lot or pool always takes the exact remainder, so
/// rounding never leaks out of a fully consumed position.
pub const ALLOCATION_SCALE: u32 = 10;

/// An open acquisition record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub asset: Asset,
    /// Acquisition order within the book, used to break date ties
    pub sequence: u64,
    pub quantity_remaining: Money,
    /// Acquisition cost still attached to `quantity_remaining`
    pub cost_remaining: Money,
    /// Fiat value per unit at acquisition
    pub unit_cost_basis: Money,
    pub acquisition_date: DateTime<Utc>,
    /// Hash of the transaction that opened the lot
    pub source_hash: String,
}

impl Lot {
    /// Cost basis of the quantity still open
    pub fn cost_basis(&self) -> Money {
        self.cost_remaining
    }

    /// Take up to `quantity` units, returning (taken, cost of taken)
    fn take(&mut self, quantity: Money) -> (Money, Money) {
        let take = self.quantity_remaining.min(quantity);
        let cost = if take == self.quantity_remaining {
            self.cost_remaining
        } else {
            self.cost_remaining
                .mul_ratio(take, self.quantity_remaining)
                .round_dp(ALLOCATION_SCALE)
                .min(self.cost_remaining)
        };
        self.quantity_remaining -= take;
        self.cost_remaining -= cost;
        (take, cost)
    }
}

/// One consumed slice of a lot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotConsumption {
    pub quantity: Money,
    pub cost_basis: Money,
    pub acquired_at: DateTime<Utc>,
}

/// Outcome of matching one disposal against a book
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// Consumed slices, in consumption order
    pub portions: Vec<LotConsumption>,
    /// Quantity no open lot could cover
    pub shortfall: Money,
}

impl MatchResult {
    pub fn matched_quantity(&self) -> Money {
        self.portions.iter().map(|p| p.quantity).sum()
    }

    pub fn cost_basis(&self) -> Money {
        self.portions.iter().map(|p| p.cost_basis).sum()
    }
}

/// Open lots of a single asset
///
/// Lots are kept sorted by the method's consumption order: by acquisition
/// for FIFO, LIFO and WAC (LIFO consumes from the back), by unit cost for
/// HIFO. Picking the next lot is O(1).
#[derive(Debug, Clone)]
pub struct LotPool {
    asset: Asset,
    method: CalculationMethod,
    lots: VecDeque<Lot>,
    next_sequence: u64,
}

impl LotPool {
    pub fn new(asset: Asset, method: CalculationMethod) -> Self {
        Self {
            asset,
            method,
            lots: VecDeque::new(),
            next_sequence: 0,
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    /// Open a new lot of `quantity` units costing `total_cost`
    pub fn acquire(
        &mut self,
        quantity: Money,
        total_cost: Money,
        date: DateTime<Utc>,
        source_hash: &str,
    ) {
        let lot = Lot {
            asset: self.asset.clone(),
            sequence: self.next_sequence,
            quantity_remaining: quantity,
            cost_remaining: total_cost,
            unit_cost_basis: total_cost / quantity,
            acquisition_date: date,
            source_hash: source_hash.to_string(),
        };
        self.next_sequence += 1;

        // Chronological input appends at the back
        let method = self.method;
        let idx = self
            .lots
            .partition_point(|open| consumption_order(method, open, &lot) == Ordering::Less);
        self.lots.insert(idx, lot);
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn total_quantity(&self) -> Money {
        self.lots.iter().map(|lot| lot.quantity_remaining).sum()
    }

    pub fn total_cost_basis(&self) -> Money {
        self.lots.iter().map(Lot::cost_basis).sum()
    }

    pub fn earliest_acquisition(&self) -> Option<DateTime<Utc>> {
        self.lots.iter().map(|lot| lot.acquisition_date).min()
    }

    fn next_lot(&mut self) -> Option<&mut Lot> {
        match self.method {
            CalculationMethod::Lifo => self.lots.back_mut(),
            _ => self.lots.front_mut(),
        }
    }

    fn pop_next(&mut self) -> Option<Lot> {
        match self.method {
            CalculationMethod::Lifo => self.lots.pop_back(),
            _ => self.lots.pop_front(),
        }
    }

    /// Consume `quantity` from the pool in the method's order
    ///
    /// A lot that is only partially consumed stays open with its reduced
    /// quantity and cost. Whatever the pool cannot cover is returned as
    /// `shortfall`.
    pub fn consume(&mut self, quantity: Money) -> MatchResult {
        let mut remaining = quantity;
        let mut portions = Vec::new();

        while remaining.is_positive() {
            let Some(lot) = self.next_lot() else {
                break;
            };
            let (take, cost) = lot.take(remaining);
            portions.push(LotConsumption {
                quantity: take,
                cost_basis: cost,
                acquired_at: lot.acquisition_date,
            });
            remaining -= take;

            if !lot.quantity_remaining.is_positive() {
                if let Some(done) = self.pop_next() {
                    debug!(
                        "Lot {} of {} ({}) fully consumed",
                        done.sequence, self.asset, done.source_hash
                    );
                }
            }
        }

        MatchResult {
            portions,
            shortfall: remaining,
        }
    }
}

/// Position of `a` relative to `b` in the method's consumption order
fn consumption_order(method: CalculationMethod, a: &Lot, b: &Lot) -> Ordering {
    match method {
        // Highest unit cost first; among equal costs the oldest lot
        CalculationMethod::Hifo => (Reverse(a.unit_cost_basis), a.acquisition_date, a.sequence)
            .cmp(&(Reverse(b.unit_cost_basis), b.acquisition_date, b.sequence)),
        _ => (a.acquisition_date, a.sequence).cmp(&(b.acquisition_date, b.sequence)),
    }
}

/// Weighted-average cost book for a single asset
#[derive(Debug, Clone)]
pub struct AverageCostPool {
    /// FIFO queue of acquisition dates; its per-lot costs are never used
    dates: LotPool,
    total_cost: Money,
}

impl AverageCostPool {
    pub fn new(asset: Asset) -> Self {
        Self {
            dates: LotPool::new(asset, CalculationMethod::Wac),
            total_cost: Money::ZERO,
        }
    }

    pub fn average_cost(&self) -> Money {
        self.total_cost / self.total_quantity()
    }

    pub fn total_cost(&self) -> Money {
        self.total_cost
    }

    pub fn total_quantity(&self) -> Money {
        self.dates.total_quantity()
    }

    /// Add units and fold their cost into the pool
    pub fn acquire(
        &mut self,
        quantity: Money,
        total_cost: Money,
        date: DateTime<Utc>,
        source_hash: &str,
    ) {
        self.total_cost += total_cost;
        self.dates.acquire(quantity, total_cost, date, source_hash);
    }

    /// Dispose units at the pool's average cost
    pub fn consume(&mut self, quantity: Money) -> MatchResult {
        let held = self.total_quantity();
        let mut result = self.dates.consume(quantity);
        let matched = result.matched_quantity();

        let cost = if matched == held {
            self.total_cost
        } else {
            self.total_cost
                .mul_ratio(matched, held)
                .round_dp(ALLOCATION_SCALE)
                .min(self.total_cost)
        };
        self.total_cost -= cost;
        if self.dates.is_empty() {
            self.total_cost = Money::ZERO;
        }

        // Spread the cost over the date slices; the last one takes the rest
        let mut unallocated = cost;
        let last = result.portions.len().saturating_sub(1);
        for (i, portion) in result.portions.iter_mut().enumerate() {
            portion.cost_basis = if i == last {
                unallocated
            } else {
                cost.mul_ratio(portion.quantity, matched)
                    .round_dp(ALLOCATION_SCALE)
            };
            unallocated -= portion.cost_basis;
        }
        result
    }
}

/// Per-asset book, selected by the run's calculation method
#[derive(Debug, Clone)]
pub enum AssetBook {
    Discrete(LotPool),
    Average(AverageCostPool),
}

impl AssetBook {
    pub fn new(asset: Asset, method: CalculationMethod) -> Self {
        if method.uses_discrete_lots() {
            AssetBook::Discrete(LotPool::new(asset, method))
        } else {
            AssetBook::Average(AverageCostPool::new(asset))
        }
    }

    /// Open `quantity` units costing `total_cost`
    pub fn acquire(
        &mut self,
        quantity: Money,
        total_cost: Money,
        date: DateTime<Utc>,
        source_hash: &str,
    ) {
        match self {
            AssetBook::Discrete(pool) => pool.acquire(quantity, total_cost, date, source_hash),
            AssetBook::Average(pool) => pool.acquire(quantity, total_cost, date, source_hash),
        }
    }

    pub fn dispose(&mut self, quantity: Money) -> MatchResult {
        match self {
            AssetBook::Discrete(pool) => pool.consume(quantity),
            AssetBook::Average(pool) => pool.consume(quantity),
        }
    }

    pub fn total_quantity(&self) -> Money {
        match self {
            AssetBook::Discrete(pool) => pool.total_quantity(),
            AssetBook::Average(pool) => pool.total_quantity(),
        }
    }

    /// Unrealized position left in the book, if any
    pub fn holding(&self) -> Option<Holding> {
        let (pool, cost_basis) = match self {
            AssetBook::Discrete(pool) => (pool, pool.total_cost_basis()),
            AssetBook::Average(avg) => (&avg.dates, avg.total_cost),
        };
        if pool.is_empty() {
            return None;
        }
        let quantity = pool.total_quantity();
        Some(Holding {
            asset: pool.asset().clone(),
            quantity,
            cost_basis,
            average_cost: cost_basis / quantity,
            open_lots: pool.len(),
            earliest_acquisition: pool.earliest_acquisition(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn m(v: i64) -> Money {
        Money::from_i64(v)
    }

    /// 10 units for 10 on day 1, 10 units for 30 on day 10
    fn two_lot_pool(method: CalculationMethod) -> LotPool {
        let mut pool = LotPool::new(Asset::new("X"), method);
        pool.acquire(m(10), m(10), day(1), "a");
        pool.acquire(m(10), m(30), day(10), "b");
        pool
    }

    #[test]
    fn test_fifo_consumes_oldest_first() {
        let mut pool = two_lot_pool(CalculationMethod::Fifo);
        let result = pool.consume(m(15));

        assert_eq!(result.cost_basis(), m(25));
        assert_eq!(result.shortfall, Money::ZERO);
        assert_eq!(result.portions.len(), 2);
        assert_eq!(result.portions[0].acquired_at, day(1));

        // Newer lot stays open with 5 units
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.total_quantity(), m(5));
        assert_eq!(pool.total_cost_basis(), m(15));
        assert_eq!(pool.lots().next().unwrap().source_hash, "b");
    }

    #[test]
    fn test_lifo_consumes_newest_first() {
        let mut pool = two_lot_pool(CalculationMethod::Lifo);
        let result = pool.consume(m(15));

        assert_eq!(result.cost_basis(), m(35));
        assert_eq!(result.portions[0].acquired_at, day(10));
        assert_eq!(pool.total_quantity(), m(5));
        assert_eq!(pool.lots().next().unwrap().source_hash, "a");
    }

    #[test]
    fn test_hifo_prefers_expensive_then_oldest() {
        let mut pool = LotPool::new(Asset::new("X"), CalculationMethod::Hifo);
        pool.acquire(m(5), m(10), day(1), "cheap");
        pool.acquire(m(5), m(35), day(2), "pricey-old");
        pool.acquire(m(5), m(35), day(3), "pricey-new");
        pool.acquire(m(5), m(20), day(4), "mid");

        let result = pool.consume(m(12));
        assert_eq!(result.portions[0].acquired_at, day(2));
        assert_eq!(result.portions[1].acquired_at, day(3));
        assert_eq!(result.portions[2].acquired_at, day(4));
        assert_eq!(result.cost_basis(), m(5 * 7 + 5 * 7 + 2 * 4));

        let left: Vec<&str> = pool.lots().map(|l| l.source_hash.as_str()).collect();
        assert_eq!(left, vec!["mid", "cheap"]);
    }

    #[test]
    fn test_same_timestamp_lifo_uses_sequence() {
        let mut pool = LotPool::new(Asset::new("X"), CalculationMethod::Lifo);
        pool.acquire(m(1), m(1), day(1), "first");
        pool.acquire(m(1), m(2), day(1), "second");

        let result = pool.consume(m(1));
        assert_eq!(result.cost_basis(), m(2));
    }

    #[test]
    fn test_out_of_order_acquisitions_are_sorted() {
        let mut pool = LotPool::new(Asset::new("X"), CalculationMethod::Fifo);
        pool.acquire(m(1), m(5), day(9), "late");
        pool.acquire(m(1), m(3), day(2), "early");

        let result = pool.consume(m(1));
        assert_eq!(result.portions[0].acquired_at, day(2));
        assert_eq!(result.cost_basis(), m(3));
    }

    #[test]
    fn test_full_lot_returns_exact_cost() {
        // 1/6 and 10/17 do not terminate
        let mut pool = LotPool::new(Asset::new("X"), CalculationMethod::Fifo);
        pool.acquire(m(6), m(1), day(1), "a");
        pool.acquire(m(17), m(10), day(2), "b");

        assert_eq!(pool.consume(m(6)).cost_basis(), m(1));
        assert_eq!(pool.consume(m(17)).cost_basis(), m(10));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_partial_slices_sum_to_lot_cost() {
        let mut pool = LotPool::new(Asset::new("X"), CalculationMethod::Fifo);
        pool.acquire(m(3), m(10), day(1), "a");

        let first = pool.consume(m(1)).cost_basis();
        let second = pool.consume(m(1)).cost_basis();
        assert_eq!(pool.total_cost_basis() + first + second, m(10));

        let last = pool.consume(m(1)).cost_basis();
        assert_eq!(first + second + last, m(10));
    }

    #[test]
    fn test_shortfall_reported() {
        let mut pool = LotPool::new(Asset::new("X"), CalculationMethod::Fifo);
        pool.acquire(m(10), m(20), day(1), "a");

        let result = pool.consume(m(20));
        assert_eq!(result.matched_quantity(), m(10));
        assert_eq!(result.shortfall, m(10));
        assert_eq!(result.cost_basis(), m(20));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_empty_pool_is_all_shortfall() {
        let mut pool = LotPool::new(Asset::new("X"), CalculationMethod::Hifo);
        let result = pool.consume(m(3));
        assert!(result.portions.is_empty());
        assert_eq!(result.shortfall, m(3));
    }

    #[test]
    fn test_weighted_average_cost() {
        let mut pool = AverageCostPool::new(Asset::new("X"));
        pool.acquire(m(10), m(10), day(1), "a");
        pool.acquire(m(10), m(30), day(10), "b");
        assert_eq!(pool.average_cost(), m(2));

        let result = pool.consume(m(15));
        assert_eq!(result.cost_basis(), m(30));
        // Holding periods still follow acquisition order
        assert_eq!(result.portions[0].acquired_at, day(1));
        assert_eq!(result.portions[0].cost_basis, m(20));
        assert_eq!(pool.total_quantity(), m(5));
        assert_eq!(pool.total_cost(), m(10));
        assert_eq!(pool.average_cost(), m(2));
    }

    #[test]
    fn test_average_pool_closes_at_exact_cost() {
        let mut pool = AverageCostPool::new(Asset::new("X"));
        pool.acquire(m(3), m(1), day(1), "a");
        pool.acquire(m(4), m(1), day(2), "b");

        let first = pool.consume(m(2)).cost_basis();
        let rest = pool.consume(m(5)).cost_basis();
        assert_eq!(first + rest, m(2));
        assert_eq!(pool.total_cost(), Money::ZERO);
    }

    #[test]
    fn test_average_resets_when_position_closes() {
        let mut pool = AverageCostPool::new(Asset::new("X"));
        pool.acquire(m(2), m(20), day(1), "a");
        pool.consume(m(2));
        assert_eq!(pool.average_cost(), Money::ZERO);

        pool.acquire(m(1), m(4), day(5), "b");
        assert_eq!(pool.average_cost(), m(4));
    }

    #[test]
    fn test_book_holding_snapshot() {
        let mut book = AssetBook::new(Asset::new("X"), CalculationMethod::Fifo);
        assert!(book.holding().is_none());

        book.acquire(m(10), m(10), day(1), "a");
        book.acquire(m(10), m(30), day(10), "b");
        book.dispose(m(15));

        let holding = book.holding().unwrap();
        assert_eq!(holding.quantity, m(5));
        assert_eq!(holding.cost_basis, m(15));
        assert_eq!(holding.average_cost, m(3));
        assert_eq!(holding.open_lots, 1);
        assert_eq!(holding.earliest_acquisition, Some(day(10)));
    }

    #[test]
    fn test_average_book_holding_uses_average() {
        let mut book = AssetBook::new(Asset::new("X"), CalculationMethod::Wac);
        book.acquire(m(10), m(10), day(1), "a");
        book.acquire(m(10), m(30), day(10), "b");
        book.dispose(m(15));

        let holding = book.holding().unwrap();
        assert_eq!(holding.cost_basis, m(10));
        assert_eq!(holding.average_cost, m(2));
    }
}
