//! Integration tests for the Credvault server.
//!
//! Each test serves the full router on an ephemeral port and drives it over HTTP.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use credvault_api::AppState;
use credvault_credentials::{CredentialStore, SpecCatalog};
use credvault_crypto::MasterKey;
use credvault_storage::{MemoryBackend, StorageBackend};
use credvault_storage_sqlite::SqliteBackend;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialView {
    pub credential_id: String,
    pub credential_type: String,
    pub key_names: Vec<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialList {
    pub credentials: Vec<CredentialView>,
}

#[derive(Debug, Serialize)]
pub struct SaveRequest {
    pub credential_id: String,
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveResponse {
    pub saved: String,
}

#[derive(Debug, Deserialize)]
pub struct RequiredCredential {
    pub credential_name: String,
    pub credential_id: String,
    pub env_var: String,
    pub tools: Vec<String>,
    pub node_types: Vec<String>,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckAgentResponse {
    pub required: Vec<RequiredCredential>,
}

// ============================================================================
// Test Server
// ============================================================================

/// A server instance running on a background task.
pub struct TestServer {
    handle: JoinHandle<()>,
    pub base_url: String,
}

impl TestServer {
    /// Serve a store with the built-in catalog.
    pub async fn start(store: CredentialStore) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind test listener")?;
        let addr = listener.local_addr()?;

        let app = credvault_api::router(AppState::new(store, SpecCatalog::builtin()));
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self {
            handle,
            base_url: format!("http://{addr}"),
        };
        server.wait_for_ready().await?;
        Ok(server)
    }

    /// Serve an in-memory store.
    pub async fn start_in_memory() -> Result<Self> {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        Self::start(CredentialStore::new(backend, MasterKey::generate())).await
    }

    /// Serve a SQLite store rooted at `data_dir`.
    pub async fn start_sqlite(data_dir: &Path, master_key: MasterKey) -> Result<Self> {
        let backend = SqliteBackend::open(data_dir).await?.with_actor("test");
        Self::start(CredentialStore::new(Arc::new(backend), master_key)).await
    }

    async fn wait_for_ready(&self) -> Result<()> {
        let client = self.client();
        for _ in 0..50 {
            if client.health().await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        bail!("Server failed to start within 1 second")
    }

    pub fn client(&self) -> CredvaultClient {
        CredvaultClient::new(&self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// HTTP client for testing the Credvault API.
pub struct CredvaultClient {
    client: Client,
    base_url: String,
}

impl CredvaultClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn expect_ok<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let error: ErrorResponse = resp.json().await?;
            bail!("{}: {}", status, error.error);
        }
        Ok(resp.json().await?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.client.get(self.url("/api/health")).send().await?;
        Self::expect_ok(resp).await
    }

    pub async fn list(&self) -> Result<CredentialList> {
        let resp = self.client.get(self.url("/api/credentials")).send().await?;
        Self::expect_ok(resp).await
    }

    pub async fn get(&self, credential_id: &str) -> Result<CredentialView> {
        let resp = self
            .client
            .get(self.url(&format!("/api/credentials/{credential_id}")))
            .send()
            .await?;
        Self::expect_ok(resp).await
    }

    pub async fn save(&self, credential_id: &str, keys: &[(&str, &str)]) -> Result<SaveResponse> {
        let req = SaveRequest {
            credential_id: credential_id.to_string(),
            keys: keys
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        let resp = self
            .client
            .post(self.url("/api/credentials"))
            .json(&req)
            .send()
            .await?;
        if resp.status() != StatusCode::CREATED {
            bail!("expected 201, got {}", resp.status());
        }
        Ok(resp.json().await?)
    }

    pub async fn delete(&self, credential_id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/credentials/{credential_id}")))
            .send()
            .await?;
        let _: serde_json::Value = Self::expect_ok(resp).await?;
        Ok(())
    }

    pub async fn check_agent(&self, agent_path: &Path) -> Result<CheckAgentResponse> {
        let resp = self
            .client
            .post(self.url("/api/credentials/check-agent"))
            .json(&serde_json::json!({ "agent_path": agent_path }))
            .send()
            .await?;
        Self::expect_ok(resp).await
    }

    /// Raw POST for malformed-request cases.
    pub async fn post_raw(&self, path: &str, body: &str) -> Result<(StatusCode, ErrorResponse)> {
        let resp = self
            .client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await?;
        let status = resp.status();
        Ok((status, resp.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_agent(dir: &Path, json: &str) {
        std::fs::write(dir.join("agent.json"), json).unwrap();
    }

    #[tokio::test]
    async fn test_server_health() {
        let server = TestServer::start_in_memory().await.unwrap();
        let health = server.client().health().await.unwrap();

        assert_eq!(health.status, "ok");
        assert!(!health.version.is_empty());
    }

    #[tokio::test]
    async fn test_full_credentials_workflow() {
        let server = TestServer::start_in_memory().await.unwrap();
        let client = server.client();

        // 1. Empty store
        assert!(client.list().await.unwrap().credentials.is_empty());

        // 2. Save two credentials
        let saved = client
            .save("github", &[("api_key", "ghp_secret")])
            .await
            .unwrap();
        assert_eq!(saved.saved, "github");
        client
            .save("hubspot", &[("access_token", "t"), ("refresh_token", "r")])
            .await
            .unwrap();

        // 3. List returns metadata only, in id order
        let list = client.list().await.unwrap();
        let ids: Vec<_> = list
            .credentials
            .iter()
            .map(|c| c.credential_id.as_str())
            .collect();
        assert_eq!(ids, vec!["github", "hubspot"]);
        assert_eq!(
            list.credentials[1].key_names,
            vec!["access_token", "refresh_token"]
        );

        // 4. Get one
        let cred = client.get("github").await.unwrap();
        assert_eq!(cred.credential_type, "api_key");
        assert_eq!(cred.key_names, vec!["api_key"]);
        let created = cred.created_at.clone().unwrap();
        assert!(cred.updated_at.is_some());

        // 5. Overwrite keeps created_at and replaces keys
        client
            .save("github", &[("token", "ghp_rotated")])
            .await
            .unwrap();
        let cred = client.get("github").await.unwrap();
        assert_eq!(cred.key_names, vec!["token"]);
        assert_eq!(cred.created_at.unwrap(), created);

        // 6. Delete, then it is gone
        client.delete("github").await.unwrap();
        let err = client.get("github").await.unwrap_err();
        assert!(err.to_string().contains("Credential 'github' not found"));
        assert!(client.delete("github").await.is_err());

        let list = client.list().await.unwrap();
        assert_eq!(list.credentials.len(), 1);
    }

    #[tokio::test]
    async fn test_secret_values_never_returned() {
        let server = TestServer::start_in_memory().await.unwrap();
        let client = server.client();
        client
            .save("openai", &[("api_key", "sk-very-secret-value")])
            .await
            .unwrap();

        let raw_get = reqwest::get(format!("{}/api/credentials/openai", server.base_url))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let raw_list = reqwest::get(format!("{}/api/credentials", server.base_url))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(!raw_get.contains("sk-very-secret-value"));
        assert!(!raw_list.contains("sk-very-secret-value"));
    }

    #[tokio::test]
    async fn test_malformed_requests_rejected() {
        let server = TestServer::start_in_memory().await.unwrap();
        let client = server.client();

        let (status, body) = client
            .post_raw("/api/credentials", r#"{"credential_id": "x"}"#)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "credential_id and keys are required");

        let (status, _) = client
            .post_raw("/api/credentials", "not json")
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = client
            .post_raw("/api/credentials/check-agent", "{}")
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "agent_path is required");
    }

    #[tokio::test]
    async fn test_check_agent_workflow() {
        let server = TestServer::start_in_memory().await.unwrap();
        let client = server.client();
        let dir = TempDir::new().unwrap();
        write_agent(
            dir.path(),
            r#"{
                "name": "research-agent",
                "nodes": [
                    {"id": "think", "node_type": "llm_generate"},
                    {"id": "search", "node_type": "function", "tools": ["web_search"]}
                ]
            }"#,
        );

        let result = client.check_agent(dir.path()).await.unwrap();
        let names: Vec<_> = result
            .required
            .iter()
            .map(|r| r.credential_name.as_str())
            .collect();
        assert_eq!(names, vec!["anthropic", "brave_search"]);
        assert!(result.required.iter().all(|r| !r.available));
        assert_eq!(result.required[0].node_types, vec!["llm_generate"]);
        assert_eq!(result.required[1].tools, vec!["web_search"]);
        assert_eq!(result.required[1].env_var, "BRAVE_SEARCH_API_KEY");

        // Storing the credential flips availability
        client
            .save("brave_search", &[("api_key", "b")])
            .await
            .unwrap();
        let result = client.check_agent(dir.path()).await.unwrap();
        let brave = result
            .required
            .iter()
            .find(|r| r.credential_id == "brave_search")
            .unwrap();
        assert!(brave.available);
    }

    #[tokio::test]
    async fn test_check_agent_missing_path_is_server_error() {
        let server = TestServer::start_in_memory().await.unwrap();
        let client = server.client();
        let dir = TempDir::new().unwrap();

        let err = client
            .check_agent(&dir.path().join("does-not-exist"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("500"));
    }

    #[tokio::test]
    async fn test_sqlite_credentials_survive_restart() {
        let data_dir = TempDir::new().unwrap();
        let master_key = MasterKey::generate();

        {
            let server = TestServer::start_sqlite(data_dir.path(), master_key.clone())
                .await
                .unwrap();
            server
                .client()
                .save("anthropic", &[("api_key", "sk-ant")])
                .await
                .unwrap();
        }

        let server = TestServer::start_sqlite(data_dir.path(), master_key)
            .await
            .unwrap();
        let client = server.client();

        let cred = client.get("anthropic").await.unwrap();
        assert_eq!(cred.key_names, vec!["api_key"]);
        assert_eq!(client.list().await.unwrap().credentials.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_wrong_master_key_fails_closed() {
        let data_dir = TempDir::new().unwrap();

        {
            let server = TestServer::start_sqlite(data_dir.path(), MasterKey::generate())
                .await
                .unwrap();
            server
                .client()
                .save("openai", &[("api_key", "sk")])
                .await
                .unwrap();
        }

        let server = TestServer::start_sqlite(data_dir.path(), MasterKey::generate())
            .await
            .unwrap();
        let err = server.client().get("openai").await.unwrap_err();
        assert!(err.to_string().starts_with("500"));
    }
}
