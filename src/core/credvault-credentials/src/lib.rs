//! # Credvault Credentials
//!
//! Encrypted credential storage and agent credential resolution.
//!
//! ## Features
//!
//! - Named credentials holding one or more secret keys
//! - Secret values that never render through `Debug`/`Display`
//! - Per-credential envelope encryption at rest
//! - Refresh-on-access through pluggable [`CredentialProvider`]s
//! - Resolution of the credentials an agent definition needs
//!   ([`CredentialSetupSession`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod error;
pub mod models;
pub mod provider;
pub mod setup;
pub mod store;

pub use catalog::{CredentialSpec, SpecCatalog};
pub use error::{CredentialError, SetupError};
pub use models::{CredentialKey, CredentialObject, CredentialType, SecretValue};
pub use provider::CredentialProvider;
pub use setup::{AgentDefinition, AgentNode, CredentialSetupSession, MissingCredential};
pub use store::CredentialStore;
