//! Crypto Tax
//!
//! Capital gains engine for cryptocurrency transaction histories. Matches
//! disposals against acquisition lots under FIFO, LIFO, HIFO or weighted
//! average cost, classifies each taxable event by holding period, and
//! aggregates the results per year.

pub mod calculator;
pub mod config;
pub mod data;
pub mod error;
pub mod lots;
pub mod method;
pub mod report;
pub mod summary;
pub mod types;
pub mod yearly;

pub use calculator::{calculate_taxes, compare_methods, TaxCalculator, TaxRules};
pub use config::Config;
pub use error::{TaxError, TaxResult};
pub use method::{CalculationMethod, QuoteCurrency};
pub use summary::{DataQualityWarning, Holding, TaxSummary, TaxableEvent, Totals};
pub use types::*;
pub use yearly::YearlyBreakdown;
