//! Integration tests for the crypto-tax engine
//!
//! These tests drive the public API end to end: loading, lot matching,
//! aggregation and export.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use std::io::Write;

use crypto_tax::data::{self, WalletSet};
use crypto_tax::report::{self, TaxReport};
use crypto_tax::{
    calculate_taxes, compare_methods, CalculationMethod, Config, DataQualityWarning, Money,
    QuoteCurrency, TaxCalculator, TaxRules, Transaction, TransferKind, YearlyBreakdown,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

fn m(v: i64) -> Money {
    Money::from_i64(v)
}

fn dec(s: &str) -> Money {
    s.parse().unwrap()
}

/// Buys and sells across two assets spanning two years
fn mixed_history() -> Vec<Transaction> {
    vec![
        Transaction::inbound("b1", day(0), "BTC", m(1), m(20000)),
        Transaction::inbound("b2", day(40), "ETH", m(10), m(15000)),
        Transaction::inbound("b3", day(100), "BTC", m(1), m(30000)),
        Transaction::outbound("s1", day(200), "ETH", m(4), m(8000)),
        Transaction::outbound("s2", day(400), "BTC", dec("1.5"), m(45000)),
        Transaction::outbound("s3", day(420), "ETH", m(6), m(6000)),
    ]
}

const WALLET: &str = "0xMine";

fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// =============================================================================
// Engine Properties
// =============================================================================

#[test]
fn test_totals_are_consistent_for_every_method() {
    let txs = mixed_history();
    for method in CalculationMethod::ALL {
        let s = calculate_taxes(&txs, method, QuoteCurrency::Eur).unwrap();
        assert_eq!(s.net_gain_or_loss, s.total_gains - s.total_losses, "{}", method);
        assert_eq!(s.total_gains, s.long_term_gains + s.short_term_gains, "{}", method);
        assert_eq!(s.total_losses, s.long_term_losses + s.short_term_losses, "{}", method);

        let event_sum: Money = s.taxable_events.iter().map(|e| e.gain_or_loss).sum();
        assert_eq!(event_sum, s.net_gain_or_loss, "{}", method);

        let proceeds: Money = s.taxable_events.iter().map(|e| e.proceeds).sum();
        assert_eq!(proceeds, m(8000 + 45000 + 6000), "{}", method);
    }
}

#[test]
fn test_idempotent_and_order_independent() {
    let txs = mixed_history();
    let reversed: Vec<Transaction> = txs.iter().rev().cloned().collect();

    for method in CalculationMethod::ALL {
        let a = calculate_taxes(&txs, method, QuoteCurrency::Usd).unwrap();
        let b = calculate_taxes(&txs, method, QuoteCurrency::Usd).unwrap();
        let c = calculate_taxes(&reversed, method, QuoteCurrency::Usd).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }
}

#[test]
fn test_empty_input() {
    for method in CalculationMethod::ALL {
        let s = calculate_taxes(&[], method, QuoteCurrency::Eur).unwrap();
        assert!(s.taxable_events.is_empty());
        assert!(s.taxable_events_by_year.is_empty());
        assert_eq!(s.net_gain_or_loss, Money::ZERO);
        assert!(s.holdings.is_empty());
    }
}

#[test]
fn test_year_partition_by_disposal_date() {
    let s = calculate_taxes(&mixed_history(), CalculationMethod::Fifo, QuoteCurrency::Eur).unwrap();
    assert_eq!(s.years(), vec![2023, 2024]);
    assert_eq!(s.taxable_events_by_year["2023"].len(), 1);

    let partitioned: usize = s.taxable_events_by_year.values().map(Vec::len).sum();
    assert_eq!(partitioned, s.taxable_events.len());

    let y2024 = s.for_year(2024);
    assert!(y2024.taxable_events.iter().all(|e| e.year() == 2024));
    assert_eq!(y2024.net_gain_or_loss, y2024.total_gains - y2024.total_losses);

    let breakdown = YearlyBreakdown::from_summary(&s);
    assert_eq!(breakdown.total_net(), s.net_gain_or_loss);
}

#[test]
fn test_fifo_mixed_history_values() {
    let s = calculate_taxes(&mixed_history(), CalculationMethod::Fifo, QuoteCurrency::Eur).unwrap();

    // ETH: 4 of 10 @ 1500 sold for 8000, short-term
    let eth_first = s.taxable_events.iter().find(|e| e.transaction.hash == "s1").unwrap();
    assert_eq!(eth_first.acquisition_cost, m(6000));
    assert_eq!(eth_first.gain_or_loss, m(2000));
    assert!(!eth_first.is_long_term);

    // BTC: 1 @ 20000 held 400 days (long) + 0.5 @ 30000 held 300 days (short)
    let btc: Vec<_> = s.taxable_events.iter().filter(|e| e.transaction.hash == "s2").collect();
    assert_eq!(btc.len(), 2);
    assert!(btc[0].is_long_term);
    assert_eq!(btc[0].quantity, m(1));
    assert_eq!(btc[0].acquisition_cost, m(20000));
    assert_eq!(btc[0].proceeds, m(30000));
    assert!(!btc[1].is_long_term);
    assert_eq!(btc[1].acquisition_cost, m(15000));
    assert_eq!(btc[1].proceeds, m(15000));
    assert_eq!(btc[0].proceeds + btc[1].proceeds, m(45000));

    // ETH: remaining 6 @ 1500 sold for 6000, acquired day 40, sold day 420
    let eth_last = s.taxable_events.iter().find(|e| e.transaction.hash == "s3").unwrap();
    assert!(eth_last.is_long_term);
    assert_eq!(eth_last.gain_or_loss, m(-3000));

    assert_eq!(s.long_term_losses, m(3000));
    assert_eq!(s.net_gain_or_loss, m(2000 + 10000 - 3000));

    // Half a BTC left
    assert_eq!(s.holdings.len(), 1);
    assert_eq!(s.holdings[0].asset.as_str(), "BTC");
    assert_eq!(s.holdings[0].quantity, dec("0.5"));
    assert_eq!(s.holdings[0].cost_basis, m(15000));
}

#[test]
fn test_hifo_differs_from_lifo_when_later_lot_is_cheaper() {
    let txs = vec![
        Transaction::inbound("b1", day(1), "X", m(10), m(50)),
        Transaction::inbound("b2", day(2), "X", m(10), m(10)),
        Transaction::outbound("s1", day(3), "X", m(5), m(40)),
    ];
    let lifo = calculate_taxes(&txs, CalculationMethod::Lifo, QuoteCurrency::Eur).unwrap();
    let hifo = calculate_taxes(&txs, CalculationMethod::Hifo, QuoteCurrency::Eur).unwrap();
    assert_eq!(lifo.taxable_events[0].acquisition_cost, m(5));
    assert_eq!(hifo.taxable_events[0].acquisition_cost, m(25));
    assert!(hifo.net_gain_or_loss < lifo.net_gain_or_loss);
}

#[test]
fn test_over_disposal_with_empty_pool() {
    let txs = vec![Transaction::outbound("s1", day(5), "DOGE", m(100), m(12))];
    let s = calculate_taxes(&txs, CalculationMethod::Fifo, QuoteCurrency::Eur).unwrap();

    assert_eq!(s.taxable_events.len(), 1);
    let event = &s.taxable_events[0];
    assert_eq!(event.acquisition_cost, Money::ZERO);
    assert_eq!(event.gain_or_loss, m(12));
    assert_eq!(event.zero_basis_quantity, m(100));
    assert!(matches!(
        s.warnings.as_slice(),
        [DataQualityWarning::InsufficientLots { .. }]
    ));
}

#[test]
fn test_swap_chain_carries_basis() {
    let txs = vec![
        Transaction::inbound("b1", day(0), "ETH", m(2), m(4000)),
        Transaction::swap("sw1", day(10), "ETH", m(2), "USDC", m(5000), m(5000)),
        Transaction::outbound("s1", day(20), "USDC", m(5000), m(5000)),
    ];
    let s = calculate_taxes(&txs, CalculationMethod::Fifo, QuoteCurrency::Usd).unwrap();

    assert_eq!(s.taxable_events.len(), 2);
    assert_eq!(s.taxable_events[0].gain_or_loss, m(1000));
    assert_eq!(s.taxable_events[1].acquisition_cost, m(5000));
    assert_eq!(s.taxable_events[1].gain_or_loss, Money::ZERO);
    assert!(s.holdings.is_empty());
}

#[test]
fn test_custom_long_term_threshold() {
    let txs = vec![
        Transaction::inbound("b1", day(0), "X", m(1), m(100)),
        Transaction::outbound("s1", day(200), "X", m(1), m(150)),
    ];

    let default = TaxCalculator::new(
        CalculationMethod::Fifo,
        QuoteCurrency::Eur,
        TaxRules::default(),
    )
    .unwrap()
    .calculate(&txs);
    assert_eq!(default.short_term_gains, m(50));

    let six_months = TaxCalculator::new(
        CalculationMethod::Fifo,
        QuoteCurrency::Eur,
        TaxRules { long_term_months: 6 },
    )
    .unwrap()
    .calculate(&txs);
    assert_eq!(six_months.long_term_gains, m(50));
}

#[test]
fn test_compare_methods_matches_individual_runs() {
    let txs = mixed_history();
    let summaries = compare_methods(&txs, QuoteCurrency::Eur, TaxRules::default()).unwrap();
    assert_eq!(summaries.len(), 4);

    for (summary, method) in summaries.iter().zip(CalculationMethod::ALL) {
        assert_eq!(summary.method, method);
        let single = calculate_taxes(&txs, method, QuoteCurrency::Eur).unwrap();
        assert_eq!(summary, &single);
    }
}

#[test]
fn test_unknown_names_rejected() {
    let err = TaxCalculator::from_names("LOFO", "EUR", TaxRules::default()).unwrap_err();
    assert!(err.is_invalid_configuration());
    let err = TaxCalculator::from_names("FIFO", "GBP", TaxRules::default()).unwrap_err();
    assert!(err.is_invalid_configuration());
}

// =============================================================================
// Loading and Export
// =============================================================================

#[test]
fn test_csv_to_report_pipeline() {
    let csv = format!(
        "hash,timestamp,from,to,asset,amount,value,direction,network,kind,contract,received_asset,received_amount\n\
         0x01,2024-01-05T10:00:00Z,0xexchange,{w},eth,2,4000,,ethereum,,,,\n\
         0x02,2024-02-01 09:30:00,{w},0xother,ETH,0.5,1500,,ethereum,,,,\n\
         0x03,2024-02-02T00:00:00Z,{w},0xmine2,ETH,1,3000,,ethereum,,,,\n\
         0x04,2024-03-01T00:00:00Z,{w},0xdex,ETH,0.5,1800,swap,ethereum,swap,,USDC,1800\n\
         0x05,2024-03-02T00:00:00Z,0xa,0xb,ETH,1,1,,ethereum,,,,\n",
        w = WALLET
    );
    let file = write_file(".csv", &csv);

    let wallets = WalletSet::new([WALLET, "0xMINE2"]);
    let txs = data::load_csv(file.path(), &wallets).unwrap();

    // Internal transfer 0x03 and unrelated 0x05 dropped
    assert_eq!(txs.len(), 3);
    assert_eq!(txs[0].asset.as_str(), "ETH");
    assert!(matches!(txs[2].kind, TransferKind::Swap { .. }));

    let summary = calculate_taxes(&txs, CalculationMethod::Fifo, QuoteCurrency::Eur).unwrap();
    assert_eq!(summary.taxable_events.len(), 2);
    assert_eq!(summary.taxable_events[0].gain_or_loss, m(500));
    assert_eq!(summary.taxable_events[1].gain_or_loss, m(800));

    let usdc = summary
        .holdings
        .iter()
        .find(|h| h.asset.as_str() == "USDC")
        .unwrap();
    assert_eq!(usdc.quantity, m(1800));

    let report = TaxReport::new(&txs, summary).unwrap();
    let out = tempfile::tempdir().unwrap();
    let (csv_path, json_path) = report::export_all(&report, out.path(), None).unwrap();

    let rows = fs::read_to_string(csv_path).unwrap();
    assert_eq!(rows.lines().count(), 3);
    let json = fs::read_to_string(json_path).unwrap();
    assert!(json.contains("\"input_fingerprint\""));
    assert!(json.contains("\"FIFO\""));
}

#[test]
fn test_multiple_wallet_files() {
    let header = "hash,timestamp,from,to,asset,amount,value\n";
    let first = write_file(
        ".csv",
        &format!("{}a1,2024-01-01T00:00:00Z,0xcex,{},SOL,10,1000\n", header, WALLET),
    );
    let second = write_file(
        ".csv",
        &format!("{}b1,2024-06-01T00:00:00Z,0xmine2,0xcex,SOL,10,2000\n", header),
    );

    let wallets = WalletSet::new([WALLET, "0xmine2"]);
    let txs = data::load_many(&[first.path(), second.path()], &wallets).unwrap();
    assert_eq!(txs.len(), 2);

    let s = calculate_taxes(&txs, CalculationMethod::Fifo, QuoteCurrency::Eur).unwrap();
    assert_eq!(s.net_gain_or_loss, m(1000));
}

#[test]
fn test_json_round_trip_through_loader() {
    let txs = mixed_history();
    let file = write_file(".json", &serde_json::to_string(&txs).unwrap());
    let loaded = data::load_transactions(file.path(), &WalletSet::default()).unwrap();
    assert_eq!(loaded, txs);
}

#[test]
fn test_config_drives_calculator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "tax": { "method": "lifo", "quote_currency": "usd", "long_term_months": 12 },
            "wallets": ["0xMine"],
            "data": { "transactions": [], "results_dir": "out" }
        }"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!(config.wallet_set().contains("0xmine"));
    let calculator = config.calculator().unwrap();
    assert_eq!(calculator.rules().long_term_months, 12);
}
