//! Subcommand implementations

pub mod calculate;
pub mod compare;
pub mod validate;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::info;

use crypto_tax::{data, Config, Transaction};

/// Load the config file and the transaction files it (or the CLI) names
pub fn load_inputs(
    config_path: &str,
    transaction_overrides: Vec<PathBuf>,
) -> Result<(Config, Vec<Transaction>)> {
    let mut config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config {}", config_path))?;
    info!("Loaded configuration from: {}", config_path);

    if !transaction_overrides.is_empty() {
        info!("Overriding transaction files: {:?}", transaction_overrides);
        config.data.transactions = transaction_overrides;
    }

    if config.data.transactions.is_empty() {
        bail!("No transaction files given (set data.transactions or pass --transactions)");
    }

    let wallets = config.wallet_set();
    info!(
        "Loading {} file(s) for {} wallet(s)",
        config.data.transactions.len(),
        wallets.len()
    );
    let transactions = data::load_many(&config.data.transactions, &wallets)?;
    info!("Loaded {} transactions", transactions.len());

    Ok((config, transactions))
}
