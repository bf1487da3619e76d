//! Common datatypes supporting functions throughout Budgeteer

use std::fmt::Display;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::Error;

/// The number of decimals kept for all amounts
pub const DECIMAL_SCALE: u32 = 2;

/// Payee name the bank uses for reversed payments. Stores never return these.
pub const PAYMENT_REVERSAL: &str = "PAYMENT REVERSAL";

/// Number of leading characters of a date that form its `YYYY-MM` month key
pub const YEAR_MONTH_LEN: usize = 7;

/// Default number of standard deviations a month may sit from the mean before it is dropped
pub const DEFAULT_OUTLIER_THRESHOLD: Decimal = Decimal::TWO;

/// Default number of transactions reported as the largest debits
pub const DEFAULT_MAX_DEBIT_COUNT: usize = 3;

/// A single line from a bank export.
///
/// A negative `amount` is money leaving the account (a debit), anything else is a credit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transaction {
    /// Posting date, expected as `YYYY-MM-DD`
    #[serde(rename = "Date")]
    pub(crate) date: String,
    /// The bank's transaction kind (e.g. `DEBIT`, `CREDIT`, `POS`)
    #[serde(rename = "Transaction")]
    pub(crate) transaction_type: String,
    /// Payee or description
    #[serde(rename = "Name")]
    pub(crate) payee_name: String,
    /// Free-form memo; empty cells become `None`
    #[serde(rename = "Memo")]
    pub(crate) memo: Option<String>,
    /// Signed amount, kept at [`DECIMAL_SCALE`] decimals
    #[serde(rename = "Amount", deserialize_with = "deserialize_decimal")]
    pub(crate) amount: Decimal,
}

/// Function to help [`serde`] deserialize from a string into a [`Decimal`] with [`DECIMAL_SCALE`] scale
fn deserialize_decimal<'de, D>(value: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let mut amount = rust_decimal::serde::str::deserialize(value)?;
    amount.rescale(DECIMAL_SCALE);
    Ok(amount)
}

impl Transaction {
    /// Creates a new transaction. The amount is rescaled to [`DECIMAL_SCALE`] decimals.
    #[must_use]
    pub fn new(
        date: impl Into<String>,
        transaction_type: impl Into<String>,
        payee_name: impl Into<String>,
        memo: Option<String>,
        mut amount: Decimal,
    ) -> Self {
        amount.rescale(DECIMAL_SCALE);
        Self {
            date: date.into(),
            transaction_type: transaction_type.into(),
            payee_name: payee_name.into(),
            memo,
            amount,
        }
    }

    /// Returns the posting date
    #[must_use]
    #[inline]
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Returns the bank's transaction kind
    #[must_use]
    #[inline]
    pub fn transaction_type(&self) -> &str {
        &self.transaction_type
    }

    /// Returns the payee name
    #[must_use]
    #[inline]
    pub fn payee_name(&self) -> &str {
        &self.payee_name
    }

    /// Returns the memo, if any
    #[must_use]
    #[inline]
    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    /// Returns the signed amount
    #[must_use]
    #[inline]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Whether money left the account
    #[must_use]
    #[inline]
    pub fn is_debit(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Returns the `YYYY-MM` grouping key.
    ///
    /// Dates are not validated; anything shorter than seven characters is its own key.
    #[must_use]
    pub fn year_month(&self) -> String {
        self.date.chars().take(YEAR_MONTH_LEN).collect()
    }

    /// Whether this is a reversed payment, which is never reported on
    #[must_use]
    #[inline]
    pub fn is_payment_reversal(&self) -> bool {
        self.payee_name == PAYMENT_REVERSAL
    }
}

/// Total debits for one calendar month
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTotal {
    /// Month key in `YYYY-MM` form
    pub year_month: String,
    /// Sum of the magnitudes of the month's debits. Never negative.
    pub total: Decimal,
}

impl Display for MonthTotal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.year_month, self.total)
    }
}

/// Summary analytics over a list of transactions.
///
/// Everything derived from months (`month_totals`, the average and the extremes) only sees the
/// months left after outlier filtering. `max_debits` is ranked over every transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReport {
    /// Surviving months, ascending by key
    pub month_totals: Vec<MonthTotal>,
    /// The largest debits, most negative first
    pub max_debits: Vec<Transaction>,
    /// Mean of `month_totals`, or zero when there are none
    pub monthly_average: Decimal,
    /// Month with the greatest total
    pub max_month: Option<String>,
    /// Total of `max_month`, or zero
    pub max_month_amount: Decimal,
    /// Month with the least total
    pub min_month: Option<String>,
    /// Total of `min_month`, or zero
    pub min_month_amount: Decimal,
}

/// Tuning knobs for the report builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Months further than this many population standard deviations from the mean are dropped
    pub outlier_threshold: Decimal,
    /// How many of the largest debits to report
    pub max_debit_count: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            max_debit_count: DEFAULT_MAX_DEBIT_COUNT,
        }
    }
}

/// Outcome of registering a batch of transactions with a [`TransactionStore`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InsertSummary {
    /// Rows actually stored
    pub inserted: usize,
    /// Rows skipped because an identical transaction was already stored
    pub duplicates: usize,
}

/// An interface to stored transactions.
///
/// Two transactions are duplicates when their date, payee name, memo and amount all match.
pub trait TransactionStore {
    /// Stores a batch of transactions, skipping duplicates
    fn register(&mut self, transactions: Vec<Transaction>) -> Result<InsertSummary, Error>;

    /// Fetches every stored transaction except reversed payments, ordered by date
    fn transactions(&self) -> Result<Vec<Transaction>, Error>;

    /// Fetches the `limit` lowest-amount transactions, excluding reversed payments
    fn largest_debits(&self, limit: usize) -> Result<Vec<Transaction>, Error>;
}

/// Holds all transactions in an in-memory structure.
///
/// # Limitations
/// No persistence.
#[derive(Default, Debug)]
pub struct MemoryTransactionStore {
    /// Storage for transactions in insertion order
    pub(crate) transactions: Vec<Transaction>,
}

impl MemoryTransactionStore {
    /// Creates a new, empty [`MemoryTransactionStore`]
    #[must_use]
    pub fn new() -> Self {
        MemoryTransactionStore::default()
    }
}
