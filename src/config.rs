//! Configuration module for stashd.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, StashError};

/// Environment variable overriding the backing store URL.
pub const ENV_DATABASE_URL: &str = "STASHD_DATABASE_URL";

/// Environment variable overriding the chunk size in bytes.
pub const ENV_CHUNK_SIZE: &str = "STASHD_CHUNK_SIZE";

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Backing store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool, in seconds.
    /// This is the bounded "server selection" timeout applied before any
    /// operation runs.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    /// Idle timeout for pooled connections, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_db_url() -> String {
    "sqlite://data/stashd.db".to_string()
}

fn default_max_connections() -> u32 {
    8
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    45
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bytes per chunk for newly created objects.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_chunk_size() -> usize {
    crate::store::DEFAULT_CHUNK_SIZE
}

fn default_max_upload_size() -> u64 {
    50
}

impl StorageConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace / debug / info / warn / error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "data/stashd.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Backing store settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| StashError::Config(format!("invalid config file: {e}")))?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `STASHD_DATABASE_URL` replaces the backing store URL and
    /// `STASHD_CHUNK_SIZE` replaces the chunk size (a positive integer
    /// number of bytes).
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            if !url.trim().is_empty() {
                self.database.url = url;
            }
        }

        if let Ok(raw) = std::env::var(ENV_CHUNK_SIZE) {
            let size: usize = raw
                .trim()
                .parse()
                .map_err(|_| StashError::Config(format!("{ENV_CHUNK_SIZE} must be an integer")))?;
            if size == 0 {
                return Err(StashError::Config(format!(
                    "{ENV_CHUNK_SIZE} must be greater than zero"
                )));
            }
            self.storage.chunk_size = size;
        }

        Ok(())
    }
}
