//! Cryptographic error types.

use thiserror::Error;

/// Errors raised while sealing or opening credential envelopes.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Master key has the wrong size or encoding.
    #[error("invalid master key: {0}")]
    InvalidKey(String),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    Derivation(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Ciphertext could not be authenticated or decrypted.
    #[error("decryption failed: {0}")]
    Decryption(String),
}
