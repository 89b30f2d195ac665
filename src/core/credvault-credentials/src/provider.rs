//! Credential refresh providers.

use async_trait::async_trait;

use crate::models::CredentialObject;

/// Renews credentials whose keys are about to expire.
///
/// A credential opts in by naming the provider in
/// [`CredentialObject::provider_id`] and setting `auto_refresh`.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Provider id matched against `CredentialObject::provider_id`.
    fn id(&self) -> &str;

    /// Returns a renewed copy of `credential`.
    ///
    /// The returned object keeps the same id; the store persists it and
    /// stamps timestamps itself.
    async fn refresh(&self, credential: &CredentialObject) -> Result<CredentialObject, String>;
}
