//! # Credvault Crypto
//!
//! Encryption at rest for credential key material.
//!
//! - [`MasterKey`]: the single 256-bit root secret of a store
//! - [`envelope`]: per-context key derivation (HKDF-SHA256) and
//!   AES-256-GCM sealing with the context bound as associated data

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod error;
pub mod master_key;

pub use error::CryptoError;
pub use master_key::MasterKey;
