//! Catalog of known credential specs.
//!
//! A spec describes one external service credential: which tools or node
//! types need it, where a user obtains it, and how it maps onto a stored
//! credential (`credential_id` / `credential_key`).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SetupError;

/// Description of a credential that agents may require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSpec {
    /// Catalog name, e.g. `brave_search`.
    pub credential_name: String,
    /// Store id when it differs from the name.
    #[serde(default)]
    pub credential_id: Option<String>,
    /// Environment variable that may supply the secret instead of the store.
    pub env_var: String,
    /// Human readable purpose.
    #[serde(default)]
    pub description: String,
    /// Where to obtain the credential.
    #[serde(default)]
    pub help_url: String,
    /// Tools that need this credential.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Node types that need this credential.
    #[serde(default)]
    pub node_types: Vec<String>,
    /// Whether a pasted API key is accepted.
    #[serde(default = "default_true")]
    pub direct_api_key_supported: bool,
    /// Whether the credential can be provisioned through Aden OAuth sync.
    #[serde(default)]
    pub aden_supported: bool,
    /// Key name inside the stored credential.
    #[serde(default = "default_credential_key")]
    pub credential_key: String,
}

fn default_true() -> bool {
    true
}

fn default_credential_key() -> String {
    "api_key".to_string()
}

impl CredentialSpec {
    /// Store id: the explicit id or else the name.
    pub fn store_id(&self) -> &str {
        self.credential_id.as_deref().unwrap_or(&self.credential_name)
    }
}

/// Ordered collection of [`CredentialSpec`]s.
#[derive(Debug, Clone, Default)]
pub struct SpecCatalog {
    specs: Vec<CredentialSpec>,
}

impl SpecCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in service specs.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for spec in builtin_specs() {
            catalog.insert(spec);
        }
        catalog
    }

    /// Adds a spec, replacing one with the same name in place.
    pub fn insert(&mut self, spec: CredentialSpec) {
        match self
            .specs
            .iter_mut()
            .find(|s| s.credential_name == spec.credential_name)
        {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    /// Merges a JSON array of specs from `path`.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, SetupError> {
        let path = path.as_ref();
        let invalid = |reason: String| SetupError::InvalidCatalog {
            path: path.to_path_buf(),
            reason,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let specs: Vec<CredentialSpec> =
            serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;

        let count = specs.len();
        for spec in specs {
            self.insert(spec);
        }
        info!(path = %path.display(), count, "Loaded credential specs");
        Ok(count)
    }

    /// Looks up a spec by name.
    pub fn get(&self, name: &str) -> Option<&CredentialSpec> {
        self.specs.iter().find(|s| s.credential_name == name)
    }

    /// Specs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CredentialSpec> {
        self.specs.iter()
    }

    /// Number of specs.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn spec(
    name: &str,
    env_var: &str,
    description: &str,
    help_url: &str,
    tools: &[&str],
    node_types: &[&str],
) -> CredentialSpec {
    CredentialSpec {
        credential_name: name.to_string(),
        credential_id: None,
        env_var: env_var.to_string(),
        description: description.to_string(),
        help_url: help_url.to_string(),
        tools: tools.iter().map(|t| t.to_string()).collect(),
        node_types: node_types.iter().map(|t| t.to_string()).collect(),
        direct_api_key_supported: true,
        aden_supported: false,
        credential_key: default_credential_key(),
    }
}

fn builtin_specs() -> Vec<CredentialSpec> {
    let llm_nodes = ["llm_generate", "llm_tool_use"];

    vec![
        spec(
            "anthropic",
            "ANTHROPIC_API_KEY",
            "API key for Anthropic Claude models",
            "https://console.anthropic.com/settings/keys",
            &[],
            &llm_nodes,
        ),
        spec(
            "openai",
            "OPENAI_API_KEY",
            "API key for OpenAI models",
            "https://platform.openai.com/api-keys",
            &[],
            &[],
        ),
        spec(
            "brave_search",
            "BRAVE_SEARCH_API_KEY",
            "API key for Brave Search",
            "https://brave.com/search/api/",
            &["web_search"],
            &[],
        ),
        CredentialSpec {
            credential_id: Some("google".to_string()),
            ..spec(
                "google_search",
                "GOOGLE_API_KEY",
                "API key for Google Custom Search",
                "https://developers.google.com/custom-search/v1/overview",
                &["google_search"],
                &[],
            )
        },
        spec(
            "github",
            "GITHUB_TOKEN",
            "Personal access token for the GitHub API",
            "https://github.com/settings/tokens",
            &[
                "github_list_repos",
                "github_get_repo",
                "github_search_repos",
                "github_list_issues",
                "github_create_issue",
                "github_list_pull_requests",
            ],
            &[],
        ),
        CredentialSpec {
            aden_supported: true,
            direct_api_key_supported: false,
            credential_key: "access_token".to_string(),
            ..spec(
                "hubspot",
                "HUBSPOT_ACCESS_TOKEN",
                "OAuth access token for the HubSpot CRM",
                "https://developers.hubspot.com/docs/api/private-apps",
                &[
                    "hubspot_search_contacts",
                    "hubspot_get_contact",
                    "hubspot_create_contact",
                    "hubspot_search_deals",
                ],
                &[],
            )
        },
    ]
}
