//! Core data types shared by the engine, the loaders and the reports

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Transaction validation
// ============================================================================

/// Validation errors for ingested transactions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionValidationError {
    #[error("transaction hash must not be empty")]
    EmptyHash,

    #[error("asset must not be empty")]
    EmptyAsset,

    #[error("amount ({0}) must be > 0")]
    NonPositiveAmount(Money),

    #[error("value ({0}) must be >= 0")]
    NegativeValue(Money),

    #[error("direction {direction} does not match transfer kind {kind}")]
    DirectionKindMismatch { direction: Direction, kind: &'static str },

    #[error("received amount ({0}) must be > 0")]
    NonPositiveReceivedAmount(Money),

    #[error("swap must exchange two different assets, got {0} on both legs")]
    SelfSwap(Asset),
}

// ============================================================================
// Asset
// ============================================================================

/// Asset identifier (token symbol or contract) using Arc<str> for cheap cloning
///
/// Identifiers are trimmed and upper-cased so that `eth` and `ETH` share one
/// lot book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(#[serde(with = "arc_str_serde")] Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.trim().to_uppercase().as_str()))
    }
}

impl Asset {
    pub fn new(s: impl AsRef<str>) -> Self {
        Asset(Arc::from(s.as_ref().trim().to_uppercase().as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Direction of a transaction relative to the user's wallets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Increases holdings of `asset` (opens a lot)
    Inbound,
    /// Decreases holdings of `asset` (taxable disposal)
    Outbound,
    /// Disposes `asset` and acquires the received asset
    Swap,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
            Direction::Swap => f.write_str("swap"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbound" | "in" | "receive" | "buy" => Ok(Direction::Inbound),
            "outbound" | "out" | "send" | "sell" => Ok(Direction::Outbound),
            "swap" | "trade" => Ok(Direction::Swap),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Shape of the transfer, depending on what moved on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferKind {
    /// Transfer of the network's native coin
    #[serde(rename = "native")]
    NativeTransfer,
    /// Transfer of a token contract
    #[serde(rename = "token")]
    TokenTransfer { contract: String },
    /// Exchange of `asset` for `received_asset`
    Swap {
        received_asset: Asset,
        received_amount: Money,
    },
}

impl TransferKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransferKind::NativeTransfer => "native",
            TransferKind::TokenTransfer { .. } => "token",
            TransferKind::Swap { .. } => "swap",
        }
    }
}

impl Default for TransferKind {
    fn default() -> Self {
        TransferKind::NativeTransfer
    }
}

/// A raw on-chain event, already enriched with its fiat value
///
/// For swaps `asset`/`amount` is the disposed leg and the acquired leg lives
/// in [`TransferKind::Swap`]. `value` is the fiat value of the whole event in
/// the run's quote currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub to_address: String,
    pub asset: Asset,
    pub amount: Money,
    pub value: Money,
    pub direction: Direction,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub kind: TransferKind,
}

impl Transaction {
    fn base(
        hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        asset: impl AsRef<str>,
        amount: Money,
        value: Money,
        direction: Direction,
    ) -> Self {
        Self {
            hash: hash.into(),
            timestamp,
            from_address: String::new(),
            to_address: String::new(),
            asset: Asset::new(asset),
            amount,
            value,
            direction,
            network: String::new(),
            kind: TransferKind::NativeTransfer,
        }
    }

    /// Acquisition of `amount` units of `asset` worth `value` in total
    pub fn inbound(
        hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        asset: impl AsRef<str>,
        amount: Money,
        value: Money,
    ) -> Self {
        Self::base(hash, timestamp, asset, amount, value, Direction::Inbound)
    }

    /// Disposal of `amount` units of `asset` realizing `value` in total
    pub fn outbound(
        hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        asset: impl AsRef<str>,
        amount: Money,
        value: Money,
    ) -> Self {
        Self::base(hash, timestamp, asset, amount, value, Direction::Outbound)
    }

    /// Exchange of `amount` of `asset` for `received_amount` of `received_asset`
    #[allow(clippy::too_many_arguments)]
    pub fn swap(
        hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        asset: impl AsRef<str>,
        amount: Money,
        received_asset: impl AsRef<str>,
        received_amount: Money,
        value: Money,
    ) -> Self {
        let mut tx = Self::base(hash, timestamp, asset, amount, value, Direction::Swap);
        tx.kind = TransferKind::Swap {
            received_asset: Asset::new(received_asset),
            received_amount,
        };
        tx
    }

    pub fn with_addresses(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_address = from.into();
        self.to_address = to.into();
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_kind(mut self, kind: TransferKind) -> Self {
        self.kind = kind;
        self
    }

    /// Fiat value per unit of `asset`
    pub fn unit_value(&self) -> Money {
        self.value / self.amount
    }

    /// Validate the transaction data
    pub fn validate(&self) -> Result<(), TransactionValidationError> {
        if self.hash.trim().is_empty() {
            return Err(TransactionValidationError::EmptyHash);
        }

        if self.asset.is_empty() {
            return Err(TransactionValidationError::EmptyAsset);
        }

        if !self.amount.is_positive() {
            return Err(TransactionValidationError::NonPositiveAmount(self.amount));
        }

        if self.value.is_negative() {
            return Err(TransactionValidationError::NegativeValue(self.value));
        }

        match (&self.direction, &self.kind) {
            (
                Direction::Swap,
                TransferKind::Swap {
                    received_asset,
                    received_amount,
                },
            ) => {
                if !received_amount.is_positive() {
                    return Err(TransactionValidationError::NonPositiveReceivedAmount(
                        *received_amount,
                    ));
                }
                if *received_asset == self.asset {
                    return Err(TransactionValidationError::SelfSwap(self.asset.clone()));
                }
            }
            (Direction::Swap, kind) | (_, kind @ TransferKind::Swap { .. }) => {
                return Err(TransactionValidationError::DirectionKindMismatch {
                    direction: self.direction,
                    kind: kind.name(),
                });
            }
            _ => {}
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

/// Money type for precise decimal arithmetic.
///
/// Wraps `rust_decimal::Decimal` and is used for every fiat value and every
/// asset quantity, so lot splitting never drifts.
///
/// # Example
/// ```
/// use crypto_tax::Money;
/// let unit = Money::new(150, 2);
/// let qty: Money = "2".parse().unwrap();
/// assert_eq!(unit * qty, Money::from_i64(3));
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub const ONE: Money = Money(Decimal::ONE);

    /// Create from a mantissa and scale, e.g. `Money::new(150, 2) == 1.50`
    pub fn new(num: i64, scale: u32) -> Self {
        Money(Decimal::new(num, scale))
    }

    pub fn from_decimal(value: Decimal) -> Self {
        Money(value)
    }

    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Strictly greater than zero
    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Strictly less than zero
    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    /// Drop trailing zeros from the scale (`1.500` -> `1.5`)
    pub fn normalize(self) -> Self {
        Money(self.0.normalize())
    }

    pub fn inner(self) -> Decimal {
        self.0
    }

    /// `self * numerator / denominator`
    ///
    /// Multiplies first for precision; when the intermediate product would
    /// overflow the ratio is taken first instead.
    pub fn mul_ratio(self, numerator: Money, denominator: Money) -> Money {
        if denominator.is_zero() {
            return Money::ZERO;
        }
        self.0
            .checked_mul(numerator.0)
            .and_then(|product| product.checked_div(denominator.0))
            .map(Money)
            .unwrap_or_else(|| self * (numerator / denominator))
    }

    fn saturated(negative: bool) -> Money {
        if negative {
            Money(Decimal::MIN)
        } else {
            Money(Decimal::MAX)
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map(Money)
    }
}

// Decimal equality ignores scale, so 1.50 == 1.5
impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.normalize().hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

// Saturates instead of panicking on overflow
impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        self.0
            .checked_mul(rhs.0)
            .map(Money)
            .unwrap_or_else(|| Money::saturated(self.is_negative() != rhs.is_negative()))
    }
}

// Division by zero yields zero; overflow saturates
impl Div for Money {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        if rhs.0.is_zero() {
            return Money::ZERO;
        }
        self.0
            .checked_div(rhs.0)
            .map(Money)
            .unwrap_or_else(|| Money::saturated(self.is_negative() != rhs.is_negative()))
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}
