//! Cost-basis methods and quote currencies
//!
//! Both enums are closed sets. Parsing from user input (config files, CLI
//! flags, environment) is the only place an unknown value can appear, and it
//! is rejected there with [`TaxError::InvalidConfiguration`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TaxError;

/// Lot consumption order used when matching disposals to acquisitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CalculationMethod {
    /// First in, first out: oldest lot first
    Fifo,
    /// Last in, first out: most recent lot first
    Lifo,
    /// Highest in, first out: most expensive lot first
    Hifo,
    /// Weighted average cost over the whole position
    Wac,
}

impl CalculationMethod {
    pub const ALL: [CalculationMethod; 4] = [
        CalculationMethod::Fifo,
        CalculationMethod::Lifo,
        CalculationMethod::Hifo,
        CalculationMethod::Wac,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CalculationMethod::Fifo => "FIFO",
            CalculationMethod::Lifo => "LIFO",
            CalculationMethod::Hifo => "HIFO",
            CalculationMethod::Wac => "WAC",
        }
    }

    /// Whether the method tracks discrete lots (everything but WAC)
    pub fn uses_discrete_lots(self) -> bool {
        !matches!(self, CalculationMethod::Wac)
    }
}

impl Default for CalculationMethod {
    fn default() -> Self {
        CalculationMethod::Fifo
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CalculationMethod {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIFO" => Ok(CalculationMethod::Fifo),
            "LIFO" => Ok(CalculationMethod::Lifo),
            "HIFO" => Ok(CalculationMethod::Hifo),
            "WAC" | "AVERAGE" => Ok(CalculationMethod::Wac),
            _ => Err(TaxError::unsupported(
                "calculation method",
                s,
                "FIFO, LIFO, HIFO, WAC",
            )),
        }
    }
}

impl TryFrom<String> for CalculationMethod {
    type Error = TaxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CalculationMethod> for String {
    fn from(method: CalculationMethod) -> Self {
        method.as_str().to_string()
    }
}

/// Fiat currency every monetary field of a run is denominated in
///
/// The engine performs no FX conversion. Transaction values must already be
/// expressed in the selected currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QuoteCurrency {
    Eur,
    Usd,
}

impl QuoteCurrency {
    pub fn code(self) -> &'static str {
        match self {
            QuoteCurrency::Eur => "EUR",
            QuoteCurrency::Usd => "USD",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            QuoteCurrency::Eur => "€",
            QuoteCurrency::Usd => "$",
        }
    }
}

impl Default for QuoteCurrency {
    fn default() -> Self {
        QuoteCurrency::Eur
    }
}

impl fmt::Display for QuoteCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

impl FromStr for QuoteCurrency {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EUR" => Ok(QuoteCurrency::Eur),
            "USD" => Ok(QuoteCurrency::Usd),
            _ => Err(TaxError::unsupported("quote currency", s, "EUR, USD")),
        }
    }
}

impl TryFrom<String> for QuoteCurrency {
    type Error = TaxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuoteCurrency> for String {
    fn from(currency: QuoteCurrency) -> Self {
        currency.code().to_string()
    }
}
