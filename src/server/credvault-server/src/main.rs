//! Credvault Server - Main entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credvault_api::AppState;
use credvault_credentials::{CredentialStore, SpecCatalog};
use credvault_crypto::MasterKey;
use credvault_storage::{MemoryBackend, StorageBackend};
use credvault_storage_sqlite::SqliteBackend;

#[derive(Parser)]
#[command(name = "credvault-server")]
#[command(about = "Credvault - encrypted credential store for agents")]
#[command(version)]
struct Cli {
    /// Server bind address
    #[arg(long, default_value = "127.0.0.1:8300", env = "CREDVAULT_BIND_ADDRESS")]
    bind: String,

    /// Directory holding the credential database
    #[arg(long, env = "CREDVAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Base64 encoded 256-bit master key
    #[arg(long, env = "CREDVAULT_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,

    /// Extra credential specs (JSON array) merged over the built-in catalog
    #[arg(long, env = "CREDVAULT_CATALOG")]
    catalog: Option<PathBuf>,

    /// Enable development mode (in-memory storage, random master key)
    #[arg(long, env = "CREDVAULT_DEV_MODE")]
    dev: bool,

    /// Allow cross-origin requests from any origin
    #[arg(long)]
    allow_cors: bool,
}

async fn build_store(cli: &Cli) -> anyhow::Result<CredentialStore> {
    if cli.dev {
        tracing::warn!("Development mode enabled - credentials are not persisted, DO NOT USE IN PRODUCTION");
        let master_key = match &cli.master_key {
            Some(encoded) => MasterKey::from_base64(encoded).context("Invalid master key")?,
            None => MasterKey::generate(),
        };
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        return Ok(CredentialStore::new(backend, master_key));
    }

    let Some(data_dir) = &cli.data_dir else {
        bail!("--data-dir (CREDVAULT_DATA_DIR) is required outside dev mode");
    };
    let Some(encoded) = &cli.master_key else {
        bail!("--master-key (CREDVAULT_MASTER_KEY) is required outside dev mode");
    };

    let master_key = MasterKey::from_base64(encoded).context("Invalid master key")?;
    let backend = SqliteBackend::open(data_dir)
        .await
        .with_context(|| format!("Failed to open storage in {}", data_dir.display()))?
        .with_actor("api");
    tracing::info!("Data directory: {}", data_dir.display());

    Ok(CredentialStore::new(Arc::new(backend), master_key))
}

fn build_catalog(cli: &Cli) -> anyhow::Result<SpecCatalog> {
    let mut catalog = SpecCatalog::builtin();
    if let Some(path) = &cli.catalog {
        catalog
            .load_file(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?;
    }
    Ok(catalog)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting Credvault server...");

    let store = build_store(&cli).await?;
    let catalog = build_catalog(&cli)?;
    tracing::info!(specs = catalog.len(), "Credential catalog ready");

    let mut app = credvault_api::router(AppState::new(store, catalog));
    if cli.allow_cors {
        app = app.layer(CorsLayer::permissive());
    }

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
