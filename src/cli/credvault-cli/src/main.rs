//! Credvault CLI - Command line interface.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "credvault")]
#[command(about = "Credvault CLI - Manage agent credentials")]
#[command(version)]
struct Cli {
    /// Credvault server address
    #[arg(long, default_value = "http://127.0.0.1:8300", env = "CREDVAULT_ADDR")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored credentials
    List,
    /// Show credential metadata
    Get {
        /// Credential id
        credential_id: String,
    },
    /// Store a credential
    Put {
        /// Credential id
        credential_id: String,
        /// Key=value pairs
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Delete a credential
    Delete {
        /// Credential id
        credential_id: String,
    },
    /// Show which credentials an agent needs
    CheckAgent {
        /// Agent directory or agent.json path (as seen by the server)
        agent_path: String,
        /// Only print credentials that are not available
        #[arg(long)]
        missing: bool,
    },
    /// Check server status
    Status,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct CredentialView {
    credential_id: String,
    credential_type: String,
    key_names: Vec<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialList {
    credentials: Vec<CredentialView>,
}

#[derive(Serialize)]
struct SaveRequest<'a> {
    credential_id: &'a str,
    keys: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    saved: String,
}

#[derive(Serialize)]
struct CheckAgentRequest<'a> {
    agent_path: &'a str,
}

#[derive(Debug, Deserialize)]
struct RequiredCredential {
    credential_name: String,
    credential_id: String,
    env_var: String,
    help_url: String,
    available: bool,
}

#[derive(Debug, Deserialize)]
struct CheckAgentResponse {
    required: Vec<RequiredCredential>,
}

// ============================================================================
// HTTP Client
// ============================================================================

struct CredvaultClient {
    client: Client,
    base_url: String,
}

impl CredvaultClient {
    fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let resp = req.send().await.context("Failed to connect to server")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error: ErrorResponse = resp.json().await.unwrap_or(ErrorResponse {
                error: format!("HTTP {status}"),
            });
            bail!("{} failed: {}", what, error.error);
        }

        resp.json().await.context("Failed to parse response")
    }

    async fn health(&self) -> Result<HealthResponse> {
        self.send(self.client.get(self.url("/api/health")), "Health check")
            .await
    }

    async fn list(&self) -> Result<CredentialList> {
        self.send(self.client.get(self.url("/api/credentials")), "List credentials")
            .await
    }

    async fn get(&self, credential_id: &str) -> Result<CredentialView> {
        let url = self.url(&format!("/api/credentials/{credential_id}"));
        self.send(self.client.get(url), "Get credential").await
    }

    async fn put(&self, credential_id: &str, keys: BTreeMap<String, String>) -> Result<SaveResponse> {
        let req = SaveRequest {
            credential_id,
            keys,
        };
        self.send(
            self.client.post(self.url("/api/credentials")).json(&req),
            "Save credential",
        )
        .await
    }

    async fn delete(&self, credential_id: &str) -> Result<serde_json::Value> {
        let url = self.url(&format!("/api/credentials/{credential_id}"));
        self.send(self.client.delete(url), "Delete credential").await
    }

    async fn check_agent(&self, agent_path: &str) -> Result<CheckAgentResponse> {
        let req = CheckAgentRequest { agent_path };
        self.send(
            self.client
                .post(self.url("/api/credentials/check-agent"))
                .json(&req),
            "Check agent",
        )
        .await
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut keys = BTreeMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("Invalid key=value pair: {}. Use format: key=value", pair);
        };
        if name.is_empty() {
            bail!("Key name cannot be empty in: {}", pair);
        }
        keys.insert(name.to_string(), value.to_string());
    }
    Ok(keys)
}

async fn cmd_status(client: &CredvaultClient) -> Result<()> {
    let health = client.health().await?;
    println!("Credvault server status:");
    println!("  Status:  {}", health.status);
    println!("  Version: {}", health.version);
    Ok(())
}

async fn cmd_list(client: &CredvaultClient) -> Result<()> {
    let result = client.list().await?;

    if result.credentials.is_empty() {
        println!("No credentials stored");
    } else {
        println!("Credentials:");
        for cred in &result.credentials {
            println!(
                "  {} ({}) keys: {}",
                cred.credential_id,
                cred.credential_type,
                cred.key_names.join(", ")
            );
        }
    }
    Ok(())
}

async fn cmd_get(client: &CredvaultClient, credential_id: &str) -> Result<()> {
    let cred = client.get(credential_id).await?;
    println!("Credential: {}", cred.credential_id);
    println!("  Type:    {}", cred.credential_type);
    println!("  Keys:    {}", cred.key_names.join(", "));
    println!("  Created: {}", cred.created_at.as_deref().unwrap_or("-"));
    println!("  Updated: {}", cred.updated_at.as_deref().unwrap_or("-"));
    Ok(())
}

async fn cmd_put(client: &CredvaultClient, credential_id: &str, pairs: &[String]) -> Result<()> {
    let keys = parse_pairs(pairs)?;
    let result = client.put(credential_id, keys).await?;
    println!("Credential '{}' saved", result.saved);
    Ok(())
}

async fn cmd_delete(client: &CredvaultClient, credential_id: &str) -> Result<()> {
    client.delete(credential_id).await?;
    println!("Credential '{}' deleted", credential_id);
    Ok(())
}

async fn cmd_check_agent(client: &CredvaultClient, agent_path: &str, missing: bool) -> Result<()> {
    let result = client.check_agent(agent_path).await?;

    let shown: Vec<&RequiredCredential> = result
        .required
        .iter()
        .filter(|r| !missing || !r.available)
        .collect();

    if shown.is_empty() {
        println!("No credentials required");
        return Ok(());
    }

    for req in shown {
        let marker = if req.available { "ok" } else { "missing" };
        println!(
            "  [{}] {} (id: {}, env: {})",
            marker, req.credential_name, req.credential_id, req.env_var
        );
        if !req.available && !req.help_url.is_empty() {
            println!("        get one at {}", req.help_url);
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = CredvaultClient::new(&cli.addr)?;

    match cli.command {
        Commands::Status => cmd_status(&client).await,
        Commands::List => cmd_list(&client).await,
        Commands::Get { credential_id } => cmd_get(&client, &credential_id).await,
        Commands::Put {
            credential_id,
            keys,
        } => cmd_put(&client, &credential_id, &keys).await,
        Commands::Delete { credential_id } => cmd_delete(&client, &credential_id).await,
        Commands::CheckAgent {
            agent_path,
            missing,
        } => cmd_check_agent(&client, &agent_path, missing).await,
    }
}
