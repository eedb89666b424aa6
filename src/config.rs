//! Configuration file parser for ~/.config/planet/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::FetchOptions;
use crate::sync::SyncOptions;

const DEFAULT_DATABASE_FILE: &str = "planet.db";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` uses `planet.db` next to the config file
    /// (see [`Config::database_path_for`]). The `--db` flag takes precedence.
    pub database_path: Option<PathBuf>,

    /// Feeds synchronized concurrently. 0 is treated as 1.
    pub workers: usize,

    /// Bound on a single fetch attempt, in seconds.
    pub fetch_timeout_secs: u64,

    /// Fetch retries after the first attempt for 429, 5xx and truncated bodies.
    pub max_retries: u32,

    /// Largest feed document accepted, in bytes.
    pub max_feed_size_bytes: usize,

    /// Stop starting new feeds after this many seconds. 0 = no deadline.
    pub batch_deadline_secs: u64,

    /// User-Agent header sent with every fetch.
    pub user_agent: String,

    /// Allow registering feeds on loopback or private addresses.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            workers: 4,
            fetch_timeout_secs: 30,
            max_retries: 3,
            max_feed_size_bytes: 10 * 1024 * 1024,
            batch_deadline_secs: 0,
            user_agent: format!("planet/{}", env!("CARGO_PKG_VERSION")),
            allow_private_hosts: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "database_path",
        "workers",
        "fetch_timeout_secs",
        "max_retries",
        "max_feed_size_bytes",
        "batch_deadline_secs",
        "user_agent",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never loaded
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), workers = config.workers, "Loaded configuration");
        Ok(config)
    }

    /// Database file for a config loaded from `config_path`
    pub fn database_path_for(&self, config_path: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_path.with_file_name(DEFAULT_DATABASE_FILE))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            max_retries: self.max_retries,
            max_size: self.max_feed_size_bytes,
            ..FetchOptions::default()
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            workers: self.workers.max(1),
            deadline: (self.batch_deadline_secs > 0)
                .then(|| Duration::from_secs(self.batch_deadline_secs)),
            allow_private_hosts: self.allow_private_hosts,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
