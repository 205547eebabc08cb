//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for the calculation settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::calculator::{TaxCalculator, TaxRules, DEFAULT_LONG_TERM_MONTHS};
use crate::data::WalletSet;
use crate::method::{CalculationMethod, QuoteCurrency};

/// Environment variable overriding `tax.method`
pub const METHOD_ENV: &str = "CRYPTO_TAX_METHOD";
/// Environment variable overriding `tax.quote_currency`
pub const CURRENCY_ENV: &str = "CRYPTO_TAX_CURRENCY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tax: TaxConfig,
    /// The user's own wallet addresses
    #[serde(default)]
    pub wallets: Vec<String>,
    #[serde(default)]
    pub data: DataConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Apply `CRYPTO_TAX_METHOD` / `CRYPTO_TAX_CURRENCY` if set
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(method) = std::env::var(METHOD_ENV) {
            self.tax.method = method
                .parse()
                .with_context(|| format!("Invalid {}", METHOD_ENV))?;
        }
        if let Ok(currency) = std::env::var(CURRENCY_ENV) {
            self.tax.quote_currency = currency
                .parse()
                .with_context(|| format!("Invalid {}", CURRENCY_ENV))?;
        }
        Ok(())
    }

    pub fn wallet_set(&self) -> WalletSet {
        WalletSet::new(&self.wallets)
    }

    /// Build the engine described by the `tax` section
    pub fn calculator(&self) -> Result<TaxCalculator> {
        TaxCalculator::new(self.tax.method, self.tax.quote_currency, self.tax.rules())
            .context("Invalid tax configuration")
    }
}

/// Tax calculation settings
///
/// Any field left out of the section falls back to [`TaxConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    pub method: CalculationMethod,
    pub quote_currency: QuoteCurrency,
    /// Holding period (months) for long-term treatment
    pub long_term_months: u32,
}

impl Default for TaxConfig {
    fn default() -> Self {
        TaxConfig {
            method: CalculationMethod::Fifo,
            quote_currency: QuoteCurrency::Eur,
            long_term_months: DEFAULT_LONG_TERM_MONTHS,
        }
    }
}

impl TaxConfig {
    pub fn rules(&self) -> TaxRules {
        TaxRules {
            long_term_months: self.long_term_months,
        }
    }
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Transaction files (CSV or JSON), one per wallet or export
    pub transactions: Vec<PathBuf>,
    pub results_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            transactions: Vec::new(),
            results_dir: PathBuf::from("results"),
        }
    }
}
