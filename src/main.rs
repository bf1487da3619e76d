use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use rust_decimal::Decimal;

use budgeteer::io;
use budgeteer::ops::mk_tx_report_with;
use budgeteer::store::{SqliteStore, DEFAULT_DATABASE};
use budgeteer::types::{ReportConfig, TransactionStore, DEFAULT_OUTLIER_THRESHOLD};

/// Clause used by `select` when none is given
const DEFAULT_SELECT: &str = "ORDER BY amount ASC LIMIT 10";

#[derive(Parser)]
#[command(
    name = "budgeteer",
    version,
    about = "Load bank transactions from CSV and report on monthly spending"
)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "BUDGETEER_DB", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate the transactions table
    Reset,
    /// Import transactions from a CSV bank export
    Load {
        /// Path to the CSV file
        file: PathBuf,
    },
    /// Show the largest debits
    Highest {
        /// Number of transactions to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Monthly totals, average and extremes
    Report {
        /// Months further than this many standard deviations from the mean are left out
        #[arg(short, long, default_value_t = DEFAULT_OUTLIER_THRESHOLD)]
        threshold: Decimal,
    },
    /// Run a raw clause against the transactions table
    #[command(name = "select", alias = "select*")]
    Select {
        /// Anything that may follow `SELECT ... FROM transactions`
        #[arg(default_value = DEFAULT_SELECT)]
        clause: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut store = SqliteStore::open(&cli.database)
        .with_context(|| format!("Couldn't open database at {}", cli.database.display()))?;
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Reset => {
            store.reset().context("Failed to reset database")?;
            println!("Database reset: {}", cli.database.display());
        }
        Commands::Load { file } => {
            if !file.exists() {
                bail!(
                    "File {} not found. Usage: budgeteer load <path-to-transactions.csv>",
                    file.display()
                );
            }
            let csv_file = File::open(&file)
                .with_context(|| format!("Couldn't open {}", file.display()))?;
            let transactions = io::load_transactions_from_csv(&mut BufReader::new(csv_file))
                .with_context(|| format!("Failed to load transactions from {}", file.display()))?;
            info!("read {} transactions from {}", transactions.len(), file.display());
            let summary = store
                .register(transactions)
                .context("Failed to store transactions")?;
            let stored = store.count().context("Failed to count transactions")?;
            println!(
                "Loaded {} transactions ({} duplicates skipped), {} in database",
                summary.inserted, summary.duplicates, stored
            );
        }
        Commands::Highest { limit } => {
            let highest = store
                .largest_debits(limit)
                .context("Failed to query transactions")?;
            io::write_transactions_table(&mut stdout, &highest)?;
        }
        Commands::Report { threshold } => {
            let transactions = store
                .transactions()
                .context("Failed to query transactions")?;
            let config = ReportConfig {
                outlier_threshold: threshold,
                ..ReportConfig::default()
            };
            let report = mk_tx_report_with(&transactions, &config);
            io::write_report(&mut stdout, &report)?;
        }
        Commands::Select { clause } => {
            let transactions = store
                .select(&clause)
                .with_context(|| format!("Query failed: {clause}"))?;
            io::write_transactions_table(&mut stdout, &transactions)?;
        }
    }
    Ok(())
}
