/// Error type that can be returned by fallible operations in this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error reading or writing CSV files; could wrap IO or parsing errors, including amounts
    /// that are not valid decimals
    #[error("Error processing CSV")]
    Load(#[from] csv::Error),
    /// Any failure reported by the SQLite store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// A stored amount could not be read back as a decimal
    #[error("Stored amount {0:?} is not a valid decimal")]
    Amount(String),
    /// Error writing output or preparing the database location
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
