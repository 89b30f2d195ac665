//! Credential CRUD and agent check handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use credvault_credentials::{
    CredentialKey, CredentialObject, CredentialSetupSession, MissingCredential,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Credential metadata as exposed over HTTP. Never carries secret values.
#[derive(Debug, Serialize)]
pub struct CredentialView {
    /// Credential id.
    pub credential_id: String,
    /// Credential type wire name.
    pub credential_type: String,
    /// Names of the stored keys.
    pub key_names: Vec<String>,
    /// RFC 3339 creation time.
    pub created_at: Option<String>,
    /// RFC 3339 last update time.
    pub updated_at: Option<String>,
}

impl From<&CredentialObject> for CredentialView {
    fn from(cred: &CredentialObject) -> Self {
        Self {
            credential_id: cred.id.clone(),
            credential_type: cred.credential_type.to_string(),
            key_names: cred.key_names(),
            created_at: cred.created_at.map(|t| t.to_rfc3339()),
            updated_at: cred.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// `GET /api/credentials` response.
#[derive(Debug, Serialize)]
pub struct CredentialList {
    /// Metadata of every stored credential.
    pub credentials: Vec<CredentialView>,
}

/// One entry of the check-agent response.
#[derive(Debug, Serialize)]
pub struct RequiredCredential {
    credential_name: String,
    credential_id: String,
    env_var: String,
    description: String,
    help_url: String,
    tools: Vec<String>,
    node_types: Vec<String>,
    available: bool,
    direct_api_key_supported: bool,
    aden_supported: bool,
    credential_key: String,
}

impl RequiredCredential {
    fn new(missing: MissingCredential, available: bool) -> Self {
        Self {
            credential_id: missing.store_id().to_string(),
            credential_name: missing.credential_name,
            env_var: missing.env_var,
            description: missing.description,
            help_url: missing.help_url,
            tools: missing.tools,
            node_types: missing.node_types,
            available,
            direct_api_key_supported: missing.direct_api_key_supported,
            aden_supported: missing.aden_supported,
            credential_key: missing.credential_key,
        }
    }
}

/// `POST /api/credentials/check-agent` response.
#[derive(Debug, Serialize)]
pub struct CheckAgentResponse {
    /// Credentials the agent requires.
    pub required: Vec<RequiredCredential>,
}

fn json_object(body: &[u8]) -> ApiResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::BadRequest(
            "invalid JSON body: expected an object".into(),
        )),
        Err(e) => Err(ApiError::BadRequest(format!("invalid JSON body: {e}"))),
    }
}

fn non_empty_str<'a>(body: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// `GET /api/credentials`
pub async fn handle_list_credentials(
    State(state): State<AppState>,
) -> ApiResult<Json<CredentialList>> {
    let mut credentials = Vec::new();
    for id in state.store.list_credentials().await? {
        // May have been deleted since listing
        if let Some(cred) = state.store.get_credential(&id, false).await? {
            credentials.push(CredentialView::from(&cred));
        }
    }
    Ok(Json(CredentialList { credentials }))
}

/// `GET /api/credentials/{credential_id}`
pub async fn handle_get_credential(
    State(state): State<AppState>,
    Path(credential_id): Path<String>,
) -> ApiResult<Json<CredentialView>> {
    match state.store.get_credential(&credential_id, false).await? {
        Some(cred) => Ok(Json(CredentialView::from(&cred))),
        None => Err(ApiError::CredentialNotFound(credential_id)),
    }
}

/// `POST /api/credentials`
///
/// Body: `{"credential_id": "...", "keys": {"key_name": "value", ...}}`
pub async fn handle_save_credential(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let body = json_object(&body)?;

    let credential_id = non_empty_str(&body, "credential_id");
    let keys = body
        .get("keys")
        .and_then(Value::as_object)
        .filter(|k| !k.is_empty());

    let (Some(credential_id), Some(keys)) = (credential_id, keys) else {
        return Err(ApiError::BadRequest(
            "credential_id and keys are required".into(),
        ));
    };

    let mut credential = CredentialObject::new(credential_id);
    for (name, value) in keys {
        let Some(secret) = value.as_str() else {
            return Err(ApiError::BadRequest(format!(
                "value of key '{name}' must be a string"
            )));
        };
        credential = credential.with_key(CredentialKey::new(name.as_str(), secret));
    }

    let saved = state.store.save_credential(credential).await?;
    info!(credential = %saved.id, keys = saved.keys.len(), "Credential stored via API");

    Ok((StatusCode::CREATED, Json(json!({ "saved": saved.id }))))
}

/// `DELETE /api/credentials/{credential_id}`
pub async fn handle_delete_credential(
    State(state): State<AppState>,
    Path(credential_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete_credential(&credential_id).await? {
        return Err(ApiError::CredentialNotFound(credential_id));
    }
    Ok(Json(json!({ "deleted": true })))
}

/// `POST /api/credentials/check-agent`
///
/// Body: `{"agent_path": "..."}`
pub async fn handle_check_agent(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<CheckAgentResponse>> {
    let body = json_object(&body)?;
    let Some(agent_path) = non_empty_str(&body, "agent_path") else {
        return Err(ApiError::BadRequest("agent_path is required".into()));
    };

    let session =
        CredentialSetupSession::from_agent_path(agent_path, &state.catalog, &state.store, false)
            .await?;

    let mut required = Vec::with_capacity(session.missing.len());
    for missing in session.missing {
        let available = state.store.is_available(missing.store_id()).await;
        required.push(RequiredCredential::new(missing, available));
    }

    debug!(agent_path = %agent_path, required = required.len(), "Checked agent credentials");
    Ok(Json(CheckAgentResponse { required }))
}

const CHECK_AGENT_SEGMENT: &str = "check-agent";

async fn get_check_agent_as_id(state: State<AppState>) -> ApiResult<Json<CredentialView>> {
    handle_get_credential(state, Path(CHECK_AGENT_SEGMENT.to_string())).await
}

async fn delete_check_agent_as_id(state: State<AppState>) -> ApiResult<Json<Value>> {
    handle_delete_credential(state, Path(CHECK_AGENT_SEGMENT.to_string())).await
}

/// Mounts the credential routes.
///
/// `check-agent` is a static segment and shadows the `{credential_id}`
/// capture, so its GET and DELETE are forwarded to the credential handlers.
pub fn register_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route(
            "/api/credentials/check-agent",
            post(handle_check_agent)
                .get(get_check_agent_as_id)
                .delete(delete_check_agent_as_id),
        )
        .route(
            "/api/credentials",
            get(handle_list_credentials).post(handle_save_credential),
        )
        .route(
            "/api/credentials/{credential_id}",
            get(handle_get_credential).delete(handle_delete_credential),
        )
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
        Router,
    };
    use credvault_credentials::{CredentialStore, SpecCatalog};
    use credvault_crypto::MasterKey;
    use credvault_storage::MemoryBackend;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    fn app() -> (AppState, Router) {
        let store = CredentialStore::new(Arc::new(MemoryBackend::new()), MasterKey::generate());
        let state = AppState::new(store, SpecCatalog::builtin());
        (state.clone(), crate::router(state))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_save_then_get_hides_secrets() {
        let (_, app) = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/credentials",
            Some(r#"{"credential_id": "github", "keys": {"api_key": "ghp_supersecret"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"saved": "github"}));

        let (status, body) = send(&app, Method::GET, "/api/credentials/github", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["credential_id"], "github");
        assert_eq!(body["credential_type"], "api_key");
        assert_eq!(body["key_names"], json!(["api_key"]));
        assert!(body["created_at"].is_string());
        assert!(body["updated_at"].is_string());
        assert!(!body.to_string().contains("ghp_supersecret"));
    }

    #[tokio::test]
    async fn test_list_credentials() {
        let (_, app) = app();

        let (status, body) = send(&app, Method::GET, "/api/credentials", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"credentials": []}));

        for id in ["slack", "anthropic"] {
            let payload = json!({"credential_id": id, "keys": {"api_key": "x", "extra": "y"}});
            let (status, _) = send(
                &app,
                Method::POST,
                "/api/credentials",
                Some(&payload.to_string()),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = send(&app, Method::GET, "/api/credentials", None).await;
        let creds = body["credentials"].as_array().unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0]["credential_id"], "anthropic");
        assert_eq!(creds[0]["key_names"], json!(["api_key", "extra"]));
        assert_eq!(creds[1]["credential_id"], "slack");
    }

    #[tokio::test]
    async fn test_get_missing_is_404() {
        let (_, app) = app();
        let (status, body) = send(&app, Method::GET, "/api/credentials/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Credential 'nope' not found"}));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_, app) = app();
        send(
            &app,
            Method::POST,
            "/api/credentials",
            Some(r#"{"credential_id": "temp", "keys": {"token": "t"}}"#),
        )
        .await;

        let (status, body) = send(&app, Method::DELETE, "/api/credentials/temp", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"deleted": true}));

        let (status, body) = send(&app, Method::DELETE, "/api/credentials/temp", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Credential 'temp' not found"}));
    }

    #[tokio::test]
    async fn test_save_validation() {
        let (_, app) = app();

        let bad_bodies = [
            r#"{}"#,
            r#"{"credential_id": "x"}"#,
            r#"{"keys": {"a": "b"}}"#,
            r#"{"credential_id": "", "keys": {"a": "b"}}"#,
            r#"{"credential_id": "x", "keys": {}}"#,
            r#"{"credential_id": "x", "keys": ["a"]}"#,
            r#"{"credential_id": 7, "keys": {"a": "b"}}"#,
        ];
        for bad in bad_bodies {
            let (status, body) = send(&app, Method::POST, "/api/credentials", Some(bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {bad}");
            assert_eq!(body, json!({"error": "credential_id and keys are required"}));
        }

        let (status, body) = send(&app, Method::POST, "/api/credentials", Some("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/credentials",
            Some(r#"{"credential_id": "x", "keys": {"a": 1}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/credentials",
            Some(r#"{"credential_id": "bad id", "keys": {"a": "b"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid credential id"));
    }

    #[tokio::test]
    async fn test_check_agent_requires_path() {
        let (_, app) = app();
        for bad in [r#"{}"#, r#"{"agent_path": ""}"#] {
            let (status, body) = send(
                &app,
                Method::POST,
                "/api/credentials/check-agent",
                Some(bad),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({"error": "agent_path is required"}));
        }
    }

    #[tokio::test]
    async fn test_check_agent_reports_requirements_and_availability() {
        let (state, app) = app();
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("agent.json"),
            r#"{"name": "scout", "nodes": [{"id": "s", "node_type": "function", "tools": ["web_search", "google_search"]}]}"#,
        )
        .unwrap();

        state
            .store
            .save_credential(
                CredentialObject::new("google").with_key(CredentialKey::new("api_key", "g")),
            )
            .await
            .unwrap();

        let payload = json!({"agent_path": dir.path()});
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/credentials/check-agent",
            Some(&payload.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let required = body["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);

        assert_eq!(required[0]["credential_name"], "brave_search");
        assert_eq!(required[0]["credential_id"], "brave_search");
        assert_eq!(required[0]["env_var"], "BRAVE_SEARCH_API_KEY");
        assert_eq!(required[0]["tools"], json!(["web_search"]));
        assert_eq!(required[0]["node_types"], json!([]));
        assert_eq!(required[0]["available"], false);
        assert_eq!(required[0]["credential_key"], "api_key");

        assert_eq!(required[1]["credential_name"], "google_search");
        assert_eq!(required[1]["credential_id"], "google");
        assert_eq!(required[1]["available"], true);
    }

    #[tokio::test]
    async fn test_check_agent_failure_is_500() {
        let (_, app) = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/credentials/check-agent",
            Some(r#"{"agent_path": "/definitely/not/here"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("agent definition not found"));
    }

    #[tokio::test]
    async fn test_check_agent_segment_reads_as_credential_id() {
        let (_, app) = app();

        let (status, body) = send(&app, Method::GET, "/api/credentials/check-agent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Credential 'check-agent' not found"}));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/credentials",
            Some(r#"{"credential_id": "check-agent", "keys": {"api_key": "x"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::GET, "/api/credentials/check-agent", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["credential_id"], "check-agent");

        let (status, body) =
            send(&app, Method::DELETE, "/api/credentials/check-agent", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"deleted": true}));
    }

    #[tokio::test]
    async fn test_health() {
        let (_, app) = app();
        let (status, body) = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
