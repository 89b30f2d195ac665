//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be opened or reached.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A query or statement failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Caller supplied an unusable key or path.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
