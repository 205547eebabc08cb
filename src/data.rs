//! Transaction loading
//!
//! Reads transaction exports from CSV or JSON files. Rows without an explicit
//! direction are classified against the user's wallet addresses; transfers
//! between two of the user's own wallets are dropped since they neither
//! acquire nor dispose anything.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{Asset, Direction, Money, Transaction, TransferKind};

// =============================================================================
// Wallets
// =============================================================================

/// How a transfer relates to the user's wallets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletRelation {
    Inbound,
    Outbound,
    /// Both ends belong to the user
    Internal,
    /// Neither end belongs to the user
    Unrelated,
}

/// Set of the user's wallet addresses (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct WalletSet {
    addresses: HashSet<String>,
}

impl WalletSet {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            addresses: addresses
                .into_iter()
                .map(|a| normalize_address(a.as_ref()))
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(&normalize_address(address))
    }

    pub fn classify(&self, from: &str, to: &str) -> WalletRelation {
        match (self.contains(from), self.contains(to)) {
            (true, true) => WalletRelation::Internal,
            (true, false) => WalletRelation::Outbound,
            (false, true) => WalletRelation::Inbound,
            (false, false) => WalletRelation::Unrelated,
        }
    }
}

fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

// =============================================================================
// CSV Loading
// =============================================================================

/// One CSV row as exported by the transaction source
#[derive(Debug, Deserialize)]
struct TransactionRecord {
    hash: String,
    timestamp: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    asset: String,
    amount: String,
    value: String,
    #[serde(default)]
    direction: String,
    #[serde(default)]
    network: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    contract: String,
    #[serde(default)]
    received_asset: String,
    #[serde(default)]
    received_amount: String,
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or unix seconds
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = raw.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }
    if let Ok(secs) = raw.parse::<i64>() {
        if let Some(dt) = Utc.timestamp_opt(secs, 0).single() {
            return Ok(dt);
        }
    }
    bail!("Failed to parse timestamp: {}", raw)
}

fn parse_money(raw: &str, field: &str) -> Result<Money> {
    raw.parse::<Money>()
        .with_context(|| format!("Failed to parse {}: '{}'", field, raw))
}

fn parse_kind(record: &TransactionRecord) -> Result<TransferKind> {
    match record.kind.trim().to_ascii_lowercase().as_str() {
        "" | "native" => Ok(TransferKind::NativeTransfer),
        "token" => {
            if record.contract.trim().is_empty() {
                bail!("Token transfer requires a contract column");
            }
            Ok(TransferKind::TokenTransfer {
                contract: record.contract.trim().to_string(),
            })
        }
        "swap" => Ok(TransferKind::Swap {
            received_asset: Asset::new(&record.received_asset),
            received_amount: parse_money(&record.received_amount, "received_amount")?,
        }),
        other => bail!("Unknown transfer kind '{}'", other),
    }
}

/// Convert a CSV row; `Ok(None)` means the row is not taxable for these wallets
fn record_to_transaction(
    record: TransactionRecord,
    wallets: &WalletSet,
) -> Result<Option<Transaction>> {
    let kind = parse_kind(&record)?;

    let direction = if !record.direction.trim().is_empty() {
        record
            .direction
            .parse::<Direction>()
            .map_err(anyhow::Error::msg)?
    } else if matches!(kind, TransferKind::Swap { .. }) {
        Direction::Swap
    } else {
        match wallets.classify(&record.from, &record.to) {
            WalletRelation::Inbound => Direction::Inbound,
            WalletRelation::Outbound => Direction::Outbound,
            WalletRelation::Internal => {
                debug!("Skipping internal transfer {}", record.hash);
                return Ok(None);
            }
            WalletRelation::Unrelated => {
                if wallets.is_empty() {
                    bail!("Missing direction and no wallets configured to infer it");
                }
                warn!(
                    "Skipping {}: neither {} nor {} is a configured wallet",
                    record.hash, record.from, record.to
                );
                return Ok(None);
            }
        }
    };

    let tx = Transaction {
        hash: record.hash.trim().to_string(),
        timestamp: parse_timestamp(&record.timestamp)?,
        from_address: record.from,
        to_address: record.to,
        asset: Asset::new(&record.asset),
        amount: parse_money(&record.amount, "amount")?,
        value: parse_money(&record.value, "value")?,
        direction,
        network: record.network.trim().to_string(),
        kind,
    };

    tx.validate()
        .with_context(|| format!("Invalid transaction {}", tx.hash))?;

    Ok(Some(tx))
}

/// Load transactions from a CSV file
///
/// Expected header:
/// `hash,timestamp,from,to,asset,amount,value,direction,network,kind,contract,received_asset,received_amount`
/// (every column after `value` is optional).
pub fn load_csv(path: impl AsRef<Path>, wallets: &WalletSet) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut transactions = Vec::new();
    let mut skipped = 0usize;

    for (row_idx, result) in reader.deserialize::<TransactionRecord>().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        match record_to_transaction(record, wallets)
            .with_context(|| format!("Invalid row {} in {}", row_idx + 1, path.display()))?
        {
            Some(tx) => transactions.push(tx),
            None => skipped += 1,
        }
    }

    info!(
        "Loaded {} transactions from {} ({} skipped)",
        transactions.len(),
        path.display(),
        skipped
    );
    Ok(transactions)
}

// =============================================================================
// JSON Loading
// =============================================================================

/// Load a JSON array of serialized [`Transaction`]s
pub fn load_json(path: impl AsRef<Path>) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let transactions: Vec<Transaction> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse transactions JSON {}", path.display()))?;

    for (idx, tx) in transactions.iter().enumerate() {
        tx.validate()
            .with_context(|| format!("Invalid transaction #{} ({})", idx + 1, tx.hash))?;
    }

    info!("Loaded {} transactions from {}", transactions.len(), path.display());
    Ok(transactions)
}

/// Load a CSV or JSON file depending on its extension
pub fn load_transactions(path: impl AsRef<Path>, wallets: &WalletSet) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("csv") => load_csv(path, wallets),
        Some("json") => load_json(path),
        _ => bail!(
            "Unsupported transaction file {} (expected .csv or .json)",
            path.display()
        ),
    }
}

/// Load and concatenate several files, e.g. one export per wallet
pub fn load_many<P: AsRef<Path>>(paths: &[P], wallets: &WalletSet) -> Result<Vec<Transaction>> {
    if paths.is_empty() {
        bail!("No transaction files given");
    }

    let mut all = Vec::new();
    for path in paths {
        let loaded = load_transactions(path, wallets)?;
        all.extend(loaded);
    }

    let unique: HashSet<(&str, &Asset, Direction)> = all
        .iter()
        .map(|tx| (tx.hash.as_str(), &tx.asset, tx.direction))
        .collect();
    if unique.len() != all.len() {
        warn!(
            "{} duplicate transactions across input files (same hash, asset and direction)",
            all.len() - unique.len()
        );
    }

    Ok(all)
}
