//! Configuration system for tweetkeep.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/tweetkeep/config.toml`
//! 3. **Environment variables** - `TWEETKEEP_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! The loaded [`Config`] is built once and handed by reference to the
//! ingestion, reconciliation and query components; nothing reads ambient
//! globals.
//!
//! # Example Configuration File
//!
//! ```toml
//! [account]
//! handle = "jack"
//!
//! [upstream]
//! base_url = "https://api.twitter.com/1.1"
//! bearer_token = "AAAA..."
//! timeout_secs = 30
//! deadline_secs = 540
//!
//! [paths]
//! db = "~/.local/share/tweetkeep/archive.db"
//!
//! [cache]
//! enabled = true
//! ttl_secs = 3600
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ArchiveError, Result};

/// Default upstream API root.
pub const DEFAULT_API_URL: &str = "https://api.twitter.com/1.1";

/// Base for permanent record urls.
pub const DEFAULT_SITE_URL: &str = "https://twitter.com/";

/// Main configuration structure for tweetkeep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The archived account.
    pub account: AccountConfig,
    /// Upstream API access.
    pub upstream: UpstreamConfig,
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Best-effort cache behavior.
    pub cache: CacheConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// The account whose timeline is archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Account handle, without the leading '@'.
    /// Environment variable: `TWEETKEEP_HANDLE`
    pub handle: String,

    /// Base used to build permanent record urls.
    pub site_url: String,
}

/// Upstream API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API root, e.g. `https://api.twitter.com/1.1`.
    /// Environment variable: `TWEETKEEP_API_URL`
    pub base_url: String,

    /// App-only bearer token.
    /// Environment variable: `TWEETKEEP_BEARER_TOKEN`
    pub bearer_token: Option<String>,

    /// Per-request timeout.
    pub timeout_secs: u64,

    /// User agent sent with every request.
    pub user_agent: String,

    /// Wall-clock budget for one sync or reconcile run (0 = unbounded).
    /// Environment variable: `TWEETKEEP_DEADLINE_SECS`
    pub deadline_secs: u64,
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `TWEETKEEP_DB`
    pub db: Option<PathBuf>,
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the in-process cache at all.
    pub enabled: bool,

    /// Entry lifetime.
    pub ttl_secs: u64,

    /// Maximum number of entries held.
    pub capacity: usize,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty, compact.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output (spinners, summaries).
    pub quiet: bool,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            handle: String::new(),
            site_url: DEFAULT_SITE_URL.to_string(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            bearer_token: None,
            timeout_secs: 30,
            user_agent: format!("tweetkeep/{}", env!("CARGO_PKG_VERSION")),
            deadline_secs: 0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            capacity: 256,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
        }
    }
}

impl AccountConfig {
    /// Permanent url for an item id.
    #[must_use]
    pub fn status_url(&self, id_str: &str) -> String {
        let base = if self.site_url.ends_with('/') {
            self.site_url.clone()
        } else {
            format!("{}/", self.site_url)
        };
        format!("{base}{}/status/{id_str}", self.handle)
    }

    /// Profile url for the account.
    #[must_use]
    pub fn profile_url(&self) -> String {
        let base = self.site_url.trim_end_matches('/');
        format!("{base}/{}", self.handle)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/tweetkeep/config.toml)
    /// 3. Compiled defaults
    pub fn load() -> Self {
        Self::load_with(Self::user_config_path().as_deref())
    }

    /// Load configuration, reading the given file instead of the user config.
    pub fn load_with(path: Option<&Path>) -> Self {
        let mut config = Self::default();

        if let Some(file_config) = path.and_then(Self::load_from_file) {
            config.merge(file_config);
        }

        config.apply_env_overrides();

        debug!(handle = %config.account.handle, "Configuration loaded");
        config
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tweetkeep").join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(handle) = std::env::var("TWEETKEEP_HANDLE") {
            self.account.handle = handle.trim_start_matches('@').to_string();
        }
        if let Ok(token) = std::env::var("TWEETKEEP_BEARER_TOKEN") {
            self.upstream.bearer_token = Some(token);
        }
        if let Ok(url) = std::env::var("TWEETKEEP_API_URL") {
            self.upstream.base_url = url;
        }
        if let Ok(deadline) = std::env::var("TWEETKEEP_DEADLINE_SECS") {
            if let Ok(n) = deadline.parse() {
                self.upstream.deadline_secs = n;
            }
        }
        if let Ok(db) = std::env::var("TWEETKEEP_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Ok(format) = std::env::var("TWEETKEEP_FORMAT") {
            self.output.format = format;
        }
        if std::env::var("TWEETKEEP_NO_COLOR").is_ok() || std::env::var("NO_COLOR").is_ok() {
            self.output.colors = false;
        }
        if std::env::var("TWEETKEEP_QUIET").is_ok() {
            self.output.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if !other.account.handle.is_empty() {
            self.account.handle = other.account.handle;
        }
        self.account.site_url = other.account.site_url;

        self.upstream.base_url = other.upstream.base_url;
        if other.upstream.bearer_token.is_some() {
            self.upstream.bearer_token = other.upstream.bearer_token;
        }
        self.upstream.timeout_secs = other.upstream.timeout_secs;
        self.upstream.user_agent = other.upstream.user_agent;
        self.upstream.deadline_secs = other.upstream.deadline_secs;

        if other.paths.db.is_some() {
            self.paths.db = other.paths.db;
        }

        self.cache = other.cache;
        self.output = other.output;
    }

    /// Set a single dotted key from a string value.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys or values that do not parse.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| ArchiveError::invalid_argument(format!("bad value for {key}: {value}")))
        }

        match key {
            "account.handle" => self.account.handle = value.trim_start_matches('@').to_string(),
            "upstream.base_url" => self.upstream.base_url = value.to_string(),
            "upstream.bearer_token" => self.upstream.bearer_token = Some(value.to_string()),
            "upstream.timeout_secs" => self.upstream.timeout_secs = parse(key, value)?,
            "upstream.deadline_secs" => self.upstream.deadline_secs = parse(key, value)?,
            "paths.db" => self.paths.db = Some(PathBuf::from(value)),
            "cache.enabled" => self.cache.enabled = parse(key, value)?,
            "cache.ttl_secs" => self.cache.ttl_secs = parse(key, value)?,
            "output.format" => self.output.format = value.to_string(),
            "output.colors" => self.output.colors = parse(key, value)?,
            _ => {
                return Err(ArchiveError::invalid_argument(format!(
                    "unknown config key: {key}"
                )));
            }
        }
        Ok(())
    }

    /// Check the settings every upstream-facing operation depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::MissingConfig`] when the handle is empty.
    pub fn validate(&self) -> Result<()> {
        if self.account.handle.trim().is_empty() {
            return Err(ArchiveError::MissingConfig {
                key: "account.handle",
            });
        }
        Ok(())
    }

    /// Get the database path, using defaults if not configured.
    pub fn db_path(&self) -> PathBuf {
        self.paths
            .db
            .clone()
            .unwrap_or_else(crate::default_db_path)
    }

    /// Save the configuration to the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::path_error("create", parent, e))?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| ArchiveError::ConfigError {
            path: config_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        std::fs::write(config_path, content)
            .map_err(|e| ArchiveError::path_error("write", config_path, e))?;
        info!("Saved config to: {}", config_path.display());
        Ok(())
    }

    /// Render the configuration with the bearer token masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.upstream.bearer_token.is_some() {
            copy.upstream.bearer_token = Some("********".to_string());
        }
        copy
    }
}
