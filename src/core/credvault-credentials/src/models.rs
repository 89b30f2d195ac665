//! Credential data model.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Kind of credential. Informational; the store treats all kinds alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Static API key.
    #[default]
    ApiKey,
    /// OAuth2 access/refresh token pair.
    Oauth2,
    /// Username and password.
    BasicAuth,
    /// Opaque bearer token.
    BearerToken,
    /// Anything else.
    Custom,
}

impl CredentialType {
    /// Wire name, e.g. `api_key`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Oauth2 => "oauth2",
            Self::BasicAuth => "basic_auth",
            Self::BearerToken => "bearer_token",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret string that is wiped on drop and never rendered.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(Zeroizing<String>);

impl SecretValue {
    /// Wraps a raw secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Returns the raw secret. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One named secret inside a credential.
#[derive(Debug, Clone)]
pub struct CredentialKey {
    /// Key name, e.g. `api_key` or `refresh_token`.
    pub name: String,
    /// Secret value.
    pub value: SecretValue,
    /// When the value stops being valid.
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form non-secret annotations.
    pub metadata: BTreeMap<String, String>,
}

impl CredentialKey {
    /// Creates a non-expiring key.
    pub fn new(name: impl Into<String>, value: impl Into<SecretValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires_at: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the expiry.
    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Whether the key has already expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    /// Whether the key expires within `skew` from now.
    pub fn needs_refresh(&self, skew: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now() + skew)
    }
}

/// A named bundle of secret keys.
#[derive(Debug, Clone)]
pub struct CredentialObject {
    /// Unique id, e.g. `github` or `anthropic`.
    pub id: String,
    /// Credential kind.
    pub credential_type: CredentialType,
    /// Keys by name.
    pub keys: BTreeMap<String, CredentialKey>,
    /// Provider that can refresh this credential.
    pub provider_id: Option<String>,
    /// Whether reads may trigger a refresh.
    pub auto_refresh: bool,
    /// First save time. Set by the store.
    pub created_at: Option<DateTime<Utc>>,
    /// Last save time. Set by the store.
    pub updated_at: Option<DateTime<Utc>>,
}

impl CredentialObject {
    /// Creates an empty API-key credential.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            credential_type: CredentialType::default(),
            keys: BTreeMap::new(),
            provider_id: None,
            auto_refresh: false,
            created_at: None,
            updated_at: None,
        }
    }

    /// Sets the credential type.
    pub fn with_type(mut self, credential_type: CredentialType) -> Self {
        self.credential_type = credential_type;
        self
    }

    /// Adds or replaces a key.
    pub fn with_key(mut self, key: CredentialKey) -> Self {
        self.keys.insert(key.name.clone(), key);
        self
    }

    /// Attaches a refresh provider and enables auto refresh.
    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self.auto_refresh = true;
        self
    }

    /// Key names in sorted order.
    pub fn key_names(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    /// Looks up a key by name.
    pub fn get_key(&self, name: &str) -> Option<&CredentialKey> {
        self.keys.get(name)
    }

    /// Whether a read should try to refresh this credential.
    pub fn needs_refresh(&self, skew: Duration) -> bool {
        self.auto_refresh && self.keys.values().any(|k| k.needs_refresh(skew))
    }

    /// Whether at least one key holds a non-empty, unexpired value.
    pub fn is_usable(&self) -> bool {
        self.keys
            .values()
            .any(|k| !k.value.is_empty() && !k.is_expired())
    }
}
