//! Error types for the preference store.
//!
//! Ordinary reads, writes and observation never surface errors: a missing or
//! undecodable value degrades to the key's default. Errors are reserved for
//! suite construction, key construction, and migration.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key name: {0}")]
    InvalidKeyName(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid suite file format: {0}")]
    InvalidFormat(String),

    #[error("Suite is locked by another process")]
    Locked,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
