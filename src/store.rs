//! Implementations of [`TransactionStore`]

use std::{path::Path, str::FromStr};

use log::{debug, info, warn};
use rusqlite::{params, Connection, ErrorCode, Params};
use rust_decimal::Decimal;

use crate::{
    errors::Error,
    types::{
        InsertSummary, MemoryTransactionStore, Transaction, TransactionStore, DECIMAL_SCALE,
        PAYMENT_REVERSAL,
    },
};

/// Where the command line tool keeps its database unless told otherwise
pub const DEFAULT_DATABASE: &str = "db/budgeteer.db";

/// Table and duplicate index. A missing memo counts as an empty one when matching duplicates.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS transactions (
        tx_date TEXT NOT NULL,
        tx TEXT NOT NULL,
        name TEXT NOT NULL,
        memo TEXT,
        amount REAL NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_entry
        ON transactions (tx_date, name, IFNULL(memo, ''), amount);
";

/// Amounts live in a `REAL` column so raw clauses sort them numerically. They are read back as
/// text and rescaled, restoring the trailing zeros SQLite drops (`-54.20` is stored as `-54.2`).
const COLUMNS: &str = "tx_date, tx, name, memo, CAST(amount AS TEXT)";

/// Whether two transactions describe the same bank entry
fn same_entry(a: &Transaction, b: &Transaction) -> bool {
    a.date == b.date
        && a.payee_name == b.payee_name
        && a.memo.as_deref().unwrap_or("") == b.memo.as_deref().unwrap_or("")
        && a.amount == b.amount
}

impl TransactionStore for MemoryTransactionStore {
    fn register(&mut self, transactions: Vec<Transaction>) -> Result<InsertSummary, Error> {
        let mut summary = InsertSummary::default();
        for transaction in transactions {
            if self
                .transactions
                .iter()
                .any(|stored| same_entry(stored, &transaction))
            {
                warn!(
                    "skipping duplicate transaction {} {} {}",
                    transaction.date, transaction.payee_name, transaction.amount
                );
                summary.duplicates += 1;
            } else {
                self.transactions.push(transaction);
                summary.inserted += 1;
            }
        }
        Ok(summary)
    }

    fn transactions(&self) -> Result<Vec<Transaction>, Error> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|tx| !tx.is_payment_reversal())
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(transactions)
    }

    fn largest_debits(&self, limit: usize) -> Result<Vec<Transaction>, Error> {
        let mut transactions = self.transactions()?;
        transactions.sort_by_key(|tx| tx.amount);
        transactions.truncate(limit);
        Ok(transactions)
    }
}

/// Holds all transactions in a SQLite database.
///
/// # Limitations
/// Only a single connection is held, so the store is not meant to be shared across threads.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`, creating its directory if needed.
    ///
    /// The database is switched to WAL journaling and the table is created if missing.
    /// # Errors
    /// [`Error::Io`] if the directory cannot be created, [`Error::Database`] for SQLite failures
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("opened {} with journal mode {mode}", path.display());
        Self::init(conn)
    }

    /// Opens a private, temporary in-memory database
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Drops every stored transaction and recreates the table
    pub fn reset(&self) -> Result<(), Error> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS transactions;{SCHEMA}"))?;
        info!("transactions table reset");
        Ok(())
    }

    /// Runs `SELECT ... FROM transactions <clause>` with a caller-supplied clause, e.g.
    /// `WHERE tx_date > '2023-10-31' ORDER BY amount ASC`.
    ///
    /// The clause is passed to SQLite verbatim. Reversed payments are dropped from the result.
    /// # Errors
    /// [`Error::Database`] if the clause is not valid SQL
    pub fn select(&self, clause: &str) -> Result<Vec<Transaction>, Error> {
        self.query(clause, [])
    }

    fn query<P: Params>(&self, clause: &str, params: P) -> Result<Vec<Transaction>, Error> {
        let sql = format!("SELECT {COLUMNS} FROM transactions {clause}");
        debug!("{sql}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut transactions = Vec::with_capacity(rows.len());
        for (date, transaction_type, payee_name, memo, amount) in rows {
            let transaction = Transaction {
                date,
                transaction_type,
                payee_name,
                memo,
                amount: parse_amount(&amount)?,
            };
            if !transaction.is_payment_reversal() {
                transactions.push(transaction);
            }
        }
        Ok(transactions)
    }

    /// Counts every stored row, reversed payments included
    pub fn count(&self) -> Result<usize, Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Parses a stored amount back to [`DECIMAL_SCALE`] decimals.
///
/// SQLite renders large or tiny reals in scientific notation.
fn parse_amount(text: &str) -> Result<Decimal, Error> {
    let mut amount = Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| Error::Amount(text.to_string()))?;
    amount.rescale(DECIMAL_SCALE);
    Ok(amount)
}

impl TransactionStore for SqliteStore {
    fn register(&mut self, transactions: Vec<Transaction>) -> Result<InsertSummary, Error> {
        let mut summary = InsertSummary::default();
        // dropping the transaction without committing rolls the whole batch back
        let db_tx = self.conn.transaction()?;
        {
            let mut insert = db_tx.prepare(
                "INSERT INTO transactions (tx_date, tx, name, memo, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for tx in &transactions {
                let result = insert.execute(params![
                    tx.date,
                    tx.transaction_type,
                    tx.payee_name,
                    tx.memo,
                    tx.amount.to_string(),
                ]);
                match result {
                    Ok(_) => summary.inserted += 1,
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.code == ErrorCode::ConstraintViolation =>
                    {
                        warn!(
                            "skipping duplicate transaction {} {} {}",
                            tx.date, tx.payee_name, tx.amount
                        );
                        summary.duplicates += 1;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        db_tx.commit()?;
        info!(
            "stored {} transactions, skipped {} duplicates",
            summary.inserted, summary.duplicates
        );
        Ok(summary)
    }

    fn transactions(&self) -> Result<Vec<Transaction>, Error> {
        self.select("ORDER BY tx_date, rowid")
    }

    fn largest_debits(&self, limit: usize) -> Result<Vec<Transaction>, Error> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query(
            "WHERE name <> ?1 ORDER BY amount ASC, rowid LIMIT ?2",
            params![PAYMENT_REVERSAL, limit],
        )
    }
}
