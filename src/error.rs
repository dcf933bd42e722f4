//! Error types for the benchmark result store
//!
//! Local errors (`InvalidShape`, `KeyArityMismatch`, `NotFound`) leave the
//! table untouched. `MigrationImpossible` and `MalformedRecord` abort a whole
//! log read: a log that cannot be parsed or upgraded is never partially folded.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Benchmark store error types
#[derive(Error, Debug)]
pub enum Error {
    /// Packed columns of one row have unequal lengths (or `_packed` is not a map of arrays)
    #[error("Invalid shape in table '{table}': {reason}")]
    InvalidShape {
        /// Table the insert was aimed at
        table: String,
        /// What was wrong with the packed part
        reason: String,
    },

    /// Key component count disagrees with the table's primary key
    #[error("Key arity mismatch in table '{table}': expected {expected} key column(s), got {actual}")]
    KeyArityMismatch {
        /// Table the key was used against
        table: String,
        /// Declared primary key arity
        expected: usize,
        /// Components in the given key
        actual: usize,
    },

    /// `get`/`delete` on a key that is not in the table
    #[error("Key {key} not found in table '{table}'")]
    NotFound {
        /// Table that was searched
        table: String,
        /// Rendered key
        key: String,
    },

    /// A required schema upgrade cannot be computed from the log contents
    #[error("Cannot migrate transaction log from version {from} to {to}: {reason}\nThe log must be repaired manually before it can be read.")]
    MigrationImpossible {
        /// Schema version of the input
        from: u32,
        /// Schema version the step was producing
        to: u32,
        /// Missing or inconsistent data
        reason: String,
    },

    /// A log record does not decode into a recognized transaction shape
    #[error("Malformed transaction log record #{record}: {reason}")]
    MalformedRecord {
        /// 1-based record number within the log
        record: usize,
        /// Why decoding failed
        reason: String,
    },

    /// Parquet export error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
