//! Credential error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the credential store.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Credential id is empty, too long, or contains unsupported characters.
    #[error("invalid credential id: {0}")]
    InvalidId(String),

    /// Credential has no keys.
    #[error("credential '{0}' has no keys")]
    NoKeys(String),

    /// Stored envelope could not be decoded.
    #[error("corrupt credential record '{id}': {reason}")]
    Corrupt {
        /// Credential id.
        id: String,
        /// What was wrong with the record.
        reason: String,
    },

    /// A provider failed to refresh a credential.
    #[error("refresh of '{id}' via provider '{provider}' failed: {reason}")]
    RefreshFailed {
        /// Credential id.
        id: String,
        /// Provider id.
        provider: String,
        /// Provider supplied reason.
        reason: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] credvault_storage::StorageError),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(#[from] credvault_crypto::CryptoError),
}

/// Errors raised while resolving the credentials an agent needs.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Agent path does not exist or has no `agent.json`.
    #[error("agent definition not found: {}", .0.display())]
    AgentNotFound(PathBuf),

    /// Agent definition could not be read or parsed.
    #[error("invalid agent definition {}: {reason}", .path.display())]
    InvalidAgent {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Agent explicitly lists a credential the catalog does not know.
    #[error("unknown credential '{0}' requested by agent")]
    UnknownCredential(String),

    /// Spec catalog file could not be loaded.
    #[error("invalid credential catalog {}: {reason}", .path.display())]
    InvalidCatalog {
        /// Catalog file.
        path: PathBuf,
        /// Reason.
        reason: String,
    },

    /// Store lookup failed while checking availability.
    #[error(transparent)]
    Store(#[from] CredentialError),
}
