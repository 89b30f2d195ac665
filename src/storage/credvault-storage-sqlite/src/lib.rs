//! # Credvault Storage - SQLite Backend
//!
//! Durable [`StorageBackend`] on a single SQLite file. Every write and delete
//! is also appended to `kv_history` with the acting principal. History rows
//! carry key, version and operation only, never values.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use tracing::{debug, info};

use credvault_storage::{StorageBackend, StorageError};

/// File name of the database inside the data directory.
pub const DATABASE_FILE: &str = "credentials.db";

const MIGRATIONS: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS kv_store (
        key        TEXT PRIMARY KEY,
        value      BLOB NOT NULL,
        version    INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS kv_history (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        key        TEXT NOT NULL,
        version    INTEGER NOT NULL,
        operation  TEXT NOT NULL,
        actor      TEXT,
        timestamp  INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_history_key ON kv_history (key)",
    "CREATE INDEX IF NOT EXISTS idx_history_timestamp ON kv_history (timestamp)",
];

/// SQLite storage backend.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    actor: Option<String>,
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Opens (creating if needed) `credentials.db` inside `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the database
    /// cannot be opened, or migrations fail.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = data_dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let db_path = dir.join(DATABASE_FILE);
        debug!(path = %db_path.display(), "Opening SQLite database");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let backend = Self {
            pool,
            actor: None,
            db_path,
        };
        backend.migrate().await?;

        info!(path = %backend.db_path.display(), "SQLite backend ready");
        Ok(backend)
    }

    /// Returns a handle that records `actor` in the audit history.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::ConnectionFailed(format!("migration failed: {e}")))?;
        }
        debug!("Migrations complete");
        Ok(())
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    fn query_failed(e: sqlx::Error) -> StorageError {
        StorageError::QueryFailed(e.to_string())
    }

    async fn record(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        key: &str,
        version: i64,
        operation: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO kv_history (key, version, operation, actor, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(version)
        .bind(operation)
        .bind(self.actor.as_deref())
        .bind(Self::now())
        .execute(&mut **tx)
        .await
        .map_err(Self::query_failed)?;
        Ok(())
    }
}

/// Escapes `LIKE` wildcards so prefixes match literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(row.map(|(v,)| v))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let now = Self::now();
        let mut tx = self.pool.begin().await.map_err(Self::query_failed)?;

        // Write first: the transaction holds the write lock from here on.
        let (version,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO kv_store (key, value, version, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = kv_store.version + 1,
                updated_at = excluded.updated_at
            RETURNING version
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::query_failed)?;

        let operation = if version == 1 { "create" } else { "update" };
        self.record(&mut tx, key, version, operation).await?;
        tx.commit().await.map_err(Self::query_failed)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(Self::query_failed)?;

        let deleted: Option<(i64,)> =
            sqlx::query_as("DELETE FROM kv_store WHERE key = ? RETURNING version")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Self::query_failed)?;

        let Some((version,)) = deleted else {
            return Ok(false);
        };

        self.record(&mut tx, key, version + 1, "delete").await?;
        tx.commit().await.map_err(Self::query_failed)?;
        Ok(true)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM kv_store WHERE key LIKE ? ESCAPE '\\' ORDER BY key")
                .bind(like_prefix(prefix))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
