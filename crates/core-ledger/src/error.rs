//! Error types for ledger operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key derivation, encryption or decryption failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid ledger configuration
    #[error("Invalid ledger configuration: {0}")]
    Config(String),

    /// Persisted unit could not be parsed
    #[error("Corrupt persisted unit {path}: {reason}")]
    CorruptUnit { path: PathBuf, reason: String },
}

impl From<ring::error::Unspecified> for LedgerError {
    fn from(_: ring::error::Unspecified) -> Self {
        LedgerError::Crypto("cipher operation failed".to_string())
    }
}
