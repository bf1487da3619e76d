#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
/// Error handling and custom [`Error`](std::error::Error) types
pub mod errors;
/// Functions for reading bank exports and rendering transactions and reports
pub mod io;
/// Report building: monthly debit totals, outlier filtering and ranking
pub mod ops;
/// Transaction stores backed by memory or SQLite
pub mod store;
/// Data types used throughout Budgeteer
pub mod types;
