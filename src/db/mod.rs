//! Backing store connectivity for stashd.
//!
//! This module provides the SQLite connection pool and migration
//! management. The pool is wrapped in a [`StoreHandle`] with an explicit
//! init / is_ready / shutdown lifecycle so request handlers receive an
//! injected, already-connected store instead of ambient global state.

mod schema;

pub use schema::MIGRATIONS;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::{Result, StashError};

/// Connection pool type for the backing store.
pub type DbPool = sqlx::SqlitePool;

/// Process-wide handle to the backing store.
///
/// Connecting is explicit and re-entrant: a second `init` call when the
/// pool is already up is a no-op, not an error. The pool applies a short
/// acquire timeout (connection selection) distinct from the longer idle
/// timeout on established connections.
pub struct StoreHandle {
    config: DatabaseConfig,
    pool: OnceCell<DbPool>,
}

impl StoreHandle {
    /// Create an unconnected handle from configuration.
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            config: config.clone(),
            pool: OnceCell::new(),
        }
    }

    /// Connect to the backing store and apply migrations.
    ///
    /// Returns Ok immediately if already connected.
    pub async fn init(&self) -> Result<()> {
        if self.pool.initialized() {
            debug!("backing store already connected");
            return Ok(());
        }

        self.pool
            .get_or_try_init(|| connect(&self.config))
            .await?;
        Ok(())
    }

    /// Whether the store has been connected.
    pub fn is_ready(&self) -> bool {
        self.pool.initialized()
    }

    /// Get the connection pool.
    ///
    /// Fails with a connection error if `init` has not completed.
    pub fn pool(&self) -> Result<&DbPool> {
        self.pool
            .get()
            .ok_or_else(|| StashError::Connection("store not initialized".to_string()))
    }

    /// Close all pooled connections.
    pub async fn shutdown(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            info!("backing store connections closed");
        }
    }

    /// Open a connected handle backed by an in-memory database.
    ///
    /// A single pooled connection holds the in-memory database alive for
    /// the lifetime of the handle.
    pub async fn open_in_memory() -> Result<Self> {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        };
        let handle = Self::new(&config);
        handle.init().await?;
        Ok(handle)
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Connect to the store and run pending migrations.
async fn connect(config: &DatabaseConfig) -> Result<DbPool> {
    info!("connecting to backing store at {}", config.url);

    ensure_parent_dir(&config.url)?;

    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| StashError::Connection(e.to_string()))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let in_memory = config.url.contains(":memory:");

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

    // An in-memory database lives and dies with its connection, so the
    // idle reaper must never reclaim it.
    pool_options = if in_memory {
        pool_options.min_connections(1).idle_timeout(None).max_lifetime(None)
    } else {
        pool_options.idle_timeout(Duration::from_secs(config.idle_timeout_secs))
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| StashError::Connection(e.to_string()))?;

    migrate(&pool).await?;

    info!("backing store connected");
    Ok(pool)
}

/// Create the parent directory for a file-backed database URL.
fn ensure_parent_dir(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);

    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    // Drop any query parameters (e.g. ?mode=rwc)
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Apply pending migrations.
async fn migrate(pool: &DbPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await?;

    if current as usize >= MIGRATIONS.len() {
        debug!("database is up to date (version {current})");
        return Ok(());
    }

    info!(
        "migrating database from version {} to {}",
        current,
        MIGRATIONS.len()
    );

    for (i, migration) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = (i + 1) as i64;
        info!("applying migration v{version}");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}
