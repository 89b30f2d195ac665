//! Encrypted credential store.
//!
//! Each credential is persisted under `credentials/<id>` as a JSON record.
//! Non-secret metadata (type, key names, timestamps) is stored in the clear;
//! the key map itself is sealed with a key derived from the master key and
//! bound to the credential id.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use credvault_crypto::{envelope, MasterKey};
use credvault_storage::StorageBackend;

use crate::error::CredentialError;
use crate::models::{CredentialKey, CredentialObject, CredentialType, SecretValue};
use crate::provider::CredentialProvider;

/// Storage key prefix for credential records.
const KEY_PREFIX: &str = "credentials/";

/// Current on-disk record format.
const RECORD_VERSION: u32 = 1;

/// Maximum credential id length.
pub const MAX_ID_LEN: usize = 128;

/// Default window before expiry in which reads trigger a refresh.
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 300;

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    version: u32,
    id: String,
    credential_type: CredentialType,
    key_names: Vec<String>,
    provider_id: Option<String>,
    auto_refresh: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Base64 of the sealed [`SealedKey`] map.
    sealed: String,
}

#[derive(Serialize, Deserialize)]
struct SealedKey {
    value: String,
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

/// Credential store backed by any [`StorageBackend`].
pub struct CredentialStore {
    backend: Arc<dyn StorageBackend>,
    master_key: MasterKey,
    providers: RwLock<HashMap<String, Arc<dyn CredentialProvider>>>,
    refresh_skew: Duration,
}

impl CredentialStore {
    /// Creates a store over `backend`, sealing with `master_key`.
    pub fn new(backend: Arc<dyn StorageBackend>, master_key: MasterKey) -> Self {
        info!(backend = backend.name(), "Credential store initialized");
        Self {
            backend,
            master_key,
            providers: RwLock::new(HashMap::new()),
            refresh_skew: Duration::seconds(DEFAULT_REFRESH_SKEW_SECS),
        }
    }

    /// Overrides how long before expiry a read refreshes a credential.
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Registers a refresh provider, replacing any with the same id.
    pub async fn register_provider(&self, provider: Arc<dyn CredentialProvider>) {
        let id = provider.id().to_string();
        debug!(provider = %id, "Registering credential provider");
        self.providers.write().await.insert(id, provider);
    }

    fn validate_id(id: &str) -> Result<(), CredentialError> {
        if id.is_empty() {
            return Err(CredentialError::InvalidId("id cannot be empty".into()));
        }
        if id.len() > MAX_ID_LEN {
            return Err(CredentialError::InvalidId(format!(
                "id longer than {MAX_ID_LEN} characters"
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(CredentialError::InvalidId(
                "id must match [A-Za-z0-9._-]+".into(),
            ));
        }
        Ok(())
    }

    fn storage_key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    /// Lists stored credential ids, sorted.
    pub async fn list_credentials(&self) -> Result<Vec<String>, CredentialError> {
        let keys = self.backend.list(KEY_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }

    /// Loads a credential.
    ///
    /// Returns `Ok(None)` for unknown (or syntactically impossible) ids. With
    /// `refresh_if_needed`, a credential about to expire is renewed through
    /// its provider; a failing or missing provider yields the stored copy.
    pub async fn get_credential(
        &self,
        id: &str,
        refresh_if_needed: bool,
    ) -> Result<Option<CredentialObject>, CredentialError> {
        if Self::validate_id(id).is_err() {
            return Ok(None);
        }

        let Some(raw) = self.backend.get(&Self::storage_key(id)).await? else {
            return Ok(None);
        };
        let credential = self.decode(id, &raw)?;

        if refresh_if_needed && credential.needs_refresh(self.refresh_skew) {
            return self.refresh(credential).await.map(Some);
        }

        Ok(Some(credential))
    }

    async fn refresh(&self, stale: CredentialObject) -> Result<CredentialObject, CredentialError> {
        let Some(provider_id) = stale.provider_id.clone() else {
            return Ok(stale);
        };
        let provider = self.providers.read().await.get(&provider_id).cloned();
        let Some(provider) = provider else {
            debug!(credential = %stale.id, provider = %provider_id, "No provider registered, serving stored credential");
            return Ok(stale);
        };

        match provider.refresh(&stale).await {
            Ok(mut fresh) => {
                fresh.id = stale.id.clone();
                fresh.created_at = stale.created_at;
                match self.save_credential(fresh).await {
                    Ok(saved) => {
                        info!(credential = %saved.id, provider = %provider_id, "Credential refreshed");
                        Ok(saved)
                    },
                    Err(e) => {
                        warn!(
                            credential = %stale.id,
                            provider = %provider_id,
                            error = %e,
                            "Could not persist refreshed credential, serving stored copy"
                        );
                        Ok(stale)
                    },
                }
            },
            Err(reason) => {
                let err = CredentialError::RefreshFailed {
                    id: stale.id.clone(),
                    provider: provider_id,
                    reason,
                };
                warn!(error = %err, "Serving stored credential after failed refresh");
                Ok(stale)
            },
        }
    }

    /// Persists a credential and returns it with timestamps filled in.
    ///
    /// An existing record keeps its original `created_at`.
    pub async fn save_credential(
        &self,
        mut credential: CredentialObject,
    ) -> Result<CredentialObject, CredentialError> {
        Self::validate_id(&credential.id)?;
        if credential.keys.is_empty() {
            return Err(CredentialError::NoKeys(credential.id));
        }

        let key = Self::storage_key(&credential.id);
        let now = Utc::now();

        let created_at = match self.backend.get(&key).await? {
            Some(raw) => Self::decode_record(&credential.id, &raw)
                .map(|r| r.created_at)
                .unwrap_or(now),
            None => credential.created_at.unwrap_or(now),
        };
        credential.created_at = Some(created_at);
        credential.updated_at = Some(now);

        let record = self.encode(&credential, created_at, now)?;
        self.backend.put(&key, &record).await?;

        debug!(
            credential = %credential.id,
            keys = credential.keys.len(),
            "Credential saved"
        );
        Ok(credential)
    }

    /// Deletes a credential. Returns whether it existed.
    pub async fn delete_credential(&self, id: &str) -> Result<bool, CredentialError> {
        if Self::validate_id(id).is_err() {
            return Ok(false);
        }
        let deleted = self.backend.delete(&Self::storage_key(id)).await?;
        if deleted {
            info!(credential = %id, "Credential deleted");
        }
        Ok(deleted)
    }

    /// Whether `id` exists and holds at least one usable key.
    ///
    /// Lookup failures are logged and reported as unavailable.
    pub async fn is_available(&self, id: &str) -> bool {
        match self.get_credential(id, false).await {
            Ok(Some(credential)) => credential.is_usable(),
            Ok(None) => false,
            Err(e) => {
                warn!(credential = %id, error = %e, "Availability check failed");
                false
            },
        }
    }

    fn encode(
        &self,
        credential: &CredentialObject,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Vec<u8>, CredentialError> {
        let sealed_keys: BTreeMap<&str, SealedKey> = credential
            .keys
            .values()
            .map(|k| {
                (
                    k.name.as_str(),
                    SealedKey {
                        value: k.value.expose().to_string(),
                        expires_at: k.expires_at,
                        metadata: k.metadata.clone(),
                    },
                )
            })
            .collect();

        let plaintext = Zeroizing::new(serde_json::to_vec(&sealed_keys).map_err(|e| {
            CredentialError::Corrupt {
                id: credential.id.clone(),
                reason: format!("serialization failed: {e}"),
            }
        })?);
        let sealed = envelope::seal(&self.master_key, &credential.id, &plaintext)?;

        let record = StoredCredential {
            version: RECORD_VERSION,
            id: credential.id.clone(),
            credential_type: credential.credential_type,
            key_names: credential.key_names(),
            provider_id: credential.provider_id.clone(),
            auto_refresh: credential.auto_refresh,
            created_at,
            updated_at,
            sealed: STANDARD.encode(sealed),
        };

        serde_json::to_vec(&record).map_err(|e| CredentialError::Corrupt {
            id: credential.id.clone(),
            reason: format!("serialization failed: {e}"),
        })
    }

    fn decode_record(id: &str, raw: &[u8]) -> Result<StoredCredential, CredentialError> {
        let record: StoredCredential =
            serde_json::from_slice(raw).map_err(|e| CredentialError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        if record.version != RECORD_VERSION {
            return Err(CredentialError::Corrupt {
                id: id.to_string(),
                reason: format!("unsupported record version {}", record.version),
            });
        }
        if record.id != id {
            return Err(CredentialError::Corrupt {
                id: id.to_string(),
                reason: format!("record belongs to '{}'", record.id),
            });
        }
        Ok(record)
    }

    fn decode(&self, id: &str, raw: &[u8]) -> Result<CredentialObject, CredentialError> {
        let record = Self::decode_record(id, raw)?;

        let sealed = STANDARD
            .decode(&record.sealed)
            .map_err(|e| CredentialError::Corrupt {
                id: id.to_string(),
                reason: format!("invalid envelope encoding: {e}"),
            })?;
        let plaintext = envelope::open(&self.master_key, id, &sealed)?;

        let sealed_keys: BTreeMap<String, SealedKey> = serde_json::from_slice(&plaintext)
            .map_err(|e| CredentialError::Corrupt {
                id: id.to_string(),
                reason: format!("invalid key payload: {e}"),
            })?;

        let keys = sealed_keys
            .into_iter()
            .map(|(name, sealed)| {
                let key = CredentialKey {
                    name: name.clone(),
                    value: SecretValue::new(sealed.value),
                    expires_at: sealed.expires_at,
                    metadata: sealed.metadata,
                };
                (name, key)
            })
            .collect();

        Ok(CredentialObject {
            id: record.id,
            credential_type: record.credential_type,
            keys,
            provider_id: record.provider_id,
            auto_refresh: record.auto_refresh,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        })
    }
}
