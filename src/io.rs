//! Helpers for reading bank exports and rendering transactions and reports

use std::io::{Read, Write};

use csv::Trim;
use log::debug;
use rust_decimal::Decimal;
use tabled::{settings::Style, Table, Tabled};

use crate::{
    errors::Error,
    types::{MonthTotal, Transaction, TxReport},
};

/// Loads transactions from a CSV-formatted bank export.
///
/// Expects input data in this format (including header):
/// ```csv
/// Date,       Transaction, Name,            Memo,        Amount
/// 2023-10-02, DEBIT,       CORNER GROCER,   card 1234,   -54.20
/// 2023-10-03, CREDIT,      PAYROLL,         ,            2400.00
/// ```
///
/// Surrounding whitespace is trimmed and an empty memo becomes `None`.
/// # Errors
/// [`Error::Load`] if the file cannot be read or an amount is not a decimal
pub fn load_transactions_from_csv<R>(reader: &mut R) -> Result<Vec<Transaction>, Error>
where
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut transactions = Vec::new();
    for record in csv_reader.deserialize() {
        let transaction: Transaction = record?;
        transactions.push(transaction);
    }
    debug!("read {} transactions from CSV", transactions.len());
    Ok(transactions)
}

/// Row used for rendering a [`Transaction`]
#[derive(Tabled)]
struct TransactionRow {
    date: String,
    amount: String,
    description: String,
}

impl From<&Transaction> for TransactionRow {
    fn from(tx: &Transaction) -> Self {
        Self {
            date: tx.date.clone(),
            amount: tx.amount.to_string(),
            description: tx.payee_name.clone(),
        }
    }
}

/// Row used for rendering a [`MonthTotal`]
#[derive(Tabled)]
struct MonthRow {
    month: String,
    total: String,
}

impl From<&MonthTotal> for MonthRow {
    fn from(month: &MonthTotal) -> Self {
        Self {
            month: month.year_month.clone(),
            total: month.total.to_string(),
        }
    }
}

fn transactions_table(transactions: &[Transaction]) -> String {
    let rows = transactions.iter().map(TransactionRow::from);
    Table::new(rows).with(Style::modern()).to_string()
}

/// Writes transactions as a table with `date`, `amount` and `description` columns.
///
/// Output looks like:
/// ```text
/// ┌────────────┬────────┬───────────────┐
/// │ date       │ amount │ description   │
/// ├────────────┼────────┼───────────────┤
/// │ 2023-10-02 │ -54.20 │ CORNER GROCER │
/// └────────────┴────────┴───────────────┘
/// ```
pub fn write_transactions_table<W>(writer: &mut W, transactions: &[Transaction]) -> Result<(), Error>
where
    W: Write,
{
    if transactions.is_empty() {
        writeln!(writer, "No transactions found.")?;
        return Ok(());
    }
    writeln!(writer, "{}", transactions_table(transactions))?;
    Ok(())
}

/// Writes a [`TxReport`]: the month table, the largest debits and a short summary.
pub fn write_report<W>(writer: &mut W, report: &TxReport) -> Result<(), Error>
where
    W: Write,
{
    writeln!(writer, "Monthly debits")?;
    if report.month_totals.is_empty() {
        writeln!(writer, "No months to report.")?;
    } else {
        let rows = report.month_totals.iter().map(MonthRow::from);
        writeln!(writer, "{}", Table::new(rows).with(Style::modern()))?;
    }
    writeln!(writer)?;

    writeln!(writer, "Largest debits")?;
    write_transactions_table(writer, &report.max_debits)?;
    writeln!(writer)?;

    writeln!(
        writer,
        "Monthly average: {:.2}",
        report.monthly_average.round_dp(2)
    )?;
    writeln!(
        writer,
        "Max month:       {}",
        month_summary(report.max_month.as_deref(), report.max_month_amount)
    )?;
    writeln!(
        writer,
        "Min month:       {}",
        month_summary(report.min_month.as_deref(), report.min_month_amount)
    )?;
    Ok(())
}

fn month_summary(year_month: Option<&str>, amount: Decimal) -> String {
    match year_month {
        Some(year_month) => format!("{year_month} ({amount})"),
        None => "-".to_string(),
    }
}
