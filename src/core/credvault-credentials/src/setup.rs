//! Agent credential resolution.
//!
//! Given an agent definition, works out which catalog credentials the agent
//! needs: a spec applies when one of its tools is used by a node, when one of
//! its node types appears in the graph, or when the agent lists it by name.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::catalog::{CredentialSpec, SpecCatalog};
use crate::error::SetupError;
use crate::store::CredentialStore;

/// File looked up when an agent path is a directory.
pub const AGENT_FILE: &str = "agent.json";

/// A node in an agent graph.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentNode {
    /// Node id.
    #[serde(default)]
    pub id: String,
    /// Node type, e.g. `llm_tool_use`.
    #[serde(default)]
    pub node_type: String,
    /// Tools the node may call.
    #[serde(default)]
    pub tools: Vec<String>,
}

/// The parts of an agent definition that drive credential requirements.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDefinition {
    /// Agent name.
    #[serde(default)]
    pub name: String,
    /// Graph nodes.
    #[serde(default)]
    pub nodes: Vec<AgentNode>,
    /// Credentials requested explicitly by name.
    #[serde(default)]
    pub credentials: Vec<String>,
}

impl AgentDefinition {
    /// Loads a definition from a JSON file or a directory holding `agent.json`.
    pub async fn load(agent_path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = resolve_agent_file(agent_path.as_ref()).await?;
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SetupError::InvalidAgent {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        serde_json::from_str(&raw).map_err(|e| SetupError::InvalidAgent {
            path,
            reason: e.to_string(),
        })
    }

    /// All tools referenced by any node.
    pub fn tools(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .flat_map(|n| n.tools.iter().map(String::as_str))
            .collect()
    }

    /// All node types in the graph.
    pub fn node_types(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .map(|n| n.node_type.as_str())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file())
}

async fn resolve_agent_file(agent_path: &Path) -> Result<PathBuf, SetupError> {
    let not_found = || SetupError::AgentNotFound(agent_path.to_path_buf());
    let meta = tokio::fs::metadata(agent_path)
        .await
        .map_err(|_| not_found())?;

    if meta.is_dir() {
        let file = agent_path.join(AGENT_FILE);
        if is_file(&file).await {
            return Ok(file);
        }
    } else if meta.is_file() {
        return Ok(agent_path.to_path_buf());
    }
    Err(not_found())
}

/// A credential the agent requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCredential {
    /// Catalog name.
    pub credential_name: String,
    /// Explicit store id, if the spec sets one.
    pub credential_id: Option<String>,
    /// Environment variable fallback.
    pub env_var: String,
    /// Human readable purpose.
    pub description: String,
    /// Where to obtain the credential.
    pub help_url: String,
    /// Agent tools that need it.
    pub tools: Vec<String>,
    /// Agent node types that need it.
    pub node_types: Vec<String>,
    /// Whether a pasted API key is accepted.
    pub direct_api_key_supported: bool,
    /// Whether Aden OAuth sync can provision it.
    pub aden_supported: bool,
    /// Key name inside the stored credential.
    pub credential_key: String,
}

impl MissingCredential {
    fn from_spec(spec: &CredentialSpec, tools: Vec<String>, node_types: Vec<String>) -> Self {
        Self {
            credential_name: spec.credential_name.clone(),
            credential_id: spec.credential_id.clone(),
            env_var: spec.env_var.clone(),
            description: spec.description.clone(),
            help_url: spec.help_url.clone(),
            tools,
            node_types,
            direct_api_key_supported: spec.direct_api_key_supported,
            aden_supported: spec.aden_supported,
            credential_key: spec.credential_key.clone(),
        }
    }

    /// Store id: the explicit id or else the name.
    pub fn store_id(&self) -> &str {
        self.credential_id.as_deref().unwrap_or(&self.credential_name)
    }

    fn env_present(&self) -> bool {
        std::env::var(&self.env_var).is_ok_and(|v| !v.trim().is_empty())
    }
}

/// Credential requirements resolved for one agent.
#[derive(Debug, Clone)]
pub struct CredentialSetupSession {
    /// Agent name from the definition.
    pub agent_name: String,
    /// Required (or, with `missing_only`, still missing) credentials in
    /// catalog order.
    pub missing: Vec<MissingCredential>,
}

impl CredentialSetupSession {
    /// Resolves requirements for the agent at `agent_path`.
    ///
    /// With `missing_only`, credentials already usable in `store` or supplied
    /// through their environment variable are dropped.
    pub async fn from_agent_path(
        agent_path: impl AsRef<Path>,
        catalog: &SpecCatalog,
        store: &CredentialStore,
        missing_only: bool,
    ) -> Result<Self, SetupError> {
        let agent = AgentDefinition::load(agent_path.as_ref()).await?;
        Self::from_definition(&agent, catalog, store, missing_only).await
    }

    /// Same as [`Self::from_agent_path`] for an already loaded definition.
    pub async fn from_definition(
        agent: &AgentDefinition,
        catalog: &SpecCatalog,
        store: &CredentialStore,
        missing_only: bool,
    ) -> Result<Self, SetupError> {
        if let Some(unknown) = agent
            .credentials
            .iter()
            .find(|name| catalog.get(name).is_none())
        {
            return Err(SetupError::UnknownCredential(unknown.clone()));
        }

        let required = Self::required(agent, catalog);

        let mut missing = Vec::with_capacity(required.len());
        for credential in required {
            if missing_only
                && (credential.env_present() || store.is_available(credential.store_id()).await)
            {
                continue;
            }
            missing.push(credential);
        }

        debug!(
            agent = %agent.name,
            missing_only,
            count = missing.len(),
            "Resolved agent credentials"
        );

        Ok(Self {
            agent_name: agent.name.clone(),
            missing,
        })
    }

    fn required(agent: &AgentDefinition, catalog: &SpecCatalog) -> Vec<MissingCredential> {
        let tools = agent.tools();
        let node_types = agent.node_types();

        catalog
            .iter()
            .filter_map(|spec| {
                let matched_tools: Vec<String> = spec
                    .tools
                    .iter()
                    .filter(|t| tools.contains(t.as_str()))
                    .cloned()
                    .collect();
                let matched_nodes: Vec<String> = spec
                    .node_types
                    .iter()
                    .filter(|t| node_types.contains(t.as_str()))
                    .cloned()
                    .collect();
                let explicit = agent.credentials.contains(&spec.credential_name);

                (explicit || !matched_tools.is_empty() || !matched_nodes.is_empty())
                    .then(|| MissingCredential::from_spec(spec, matched_tools, matched_nodes))
            })
            .collect()
    }
}
