//! Shared handler state.

use std::sync::Arc;

use credvault_credentials::{CredentialStore, SpecCatalog};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Credential store.
    pub store: Arc<CredentialStore>,
    /// Known credential specs for agent checks.
    pub catalog: Arc<SpecCatalog>,
}

impl AppState {
    /// Bundles a store and a catalog.
    pub fn new(store: CredentialStore, catalog: SpecCatalog) -> Self {
        Self {
            store: Arc::new(store),
            catalog: Arc::new(catalog),
        }
    }
}
