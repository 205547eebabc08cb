//! Crypto tax calculator - main entry point
//!
//! This binary provides three subcommands:
//! - calculate: Compute capital gains with one method
//! - compare: Run every method side by side
//! - validate: Check transaction files without computing taxes

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "crypto-tax")]
#[command(about = "Capital gains calculator for crypto transaction histories", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Calculate capital gains
    Calculate {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Transaction files (overrides config file, repeatable)
        #[arg(short, long = "transactions")]
        transactions: Vec<PathBuf>,

        /// Calculation method: fifo, lifo, hifo, wac
        #[arg(short, long)]
        method: Option<String>,

        /// Quote currency: EUR, USD
        #[arg(long)]
        currency: Option<String>,

        /// Restrict output to one tax year
        #[arg(short, long)]
        year: Option<i32>,

        /// Output directory for CSV/JSON exports (overrides config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print open positions
        #[arg(long)]
        holdings: bool,
    },

    /// Compare all calculation methods
    Compare {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Transaction files (overrides config file, repeatable)
        #[arg(short, long = "transactions")]
        transactions: Vec<PathBuf>,

        /// Quote currency: EUR, USD
        #[arg(long)]
        currency: Option<String>,

        /// Sort results by (net, gains, losses)
        #[arg(long, default_value = "net")]
        sort_by: String,
    },

    /// Validate transaction files
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Transaction files (overrides config file, repeatable)
        #[arg(short, long = "transactions")]
        transactions: Vec<PathBuf>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Calculate { .. } => "calculate",
        Commands::Compare { .. } => "compare",
        Commands::Validate { .. } => "validate",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Calculate {
            config,
            transactions,
            method,
            currency,
            year,
            output,
            holdings,
        } => commands::calculate::run(commands::calculate::CalculateArgs {
            config_path: config,
            transactions,
            method,
            currency,
            year,
            output,
            show_holdings: holdings,
        }),

        Commands::Compare {
            config,
            transactions,
            currency,
            sort_by,
        } => commands::compare::run(config, transactions, currency, sort_by),

        Commands::Validate {
            config,
            transactions,
        } => commands::validate::run(config, transactions),
    }
}
