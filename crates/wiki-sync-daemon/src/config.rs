//! Configuration file loading and validation.
//!
//! ```json
//! {
//!   "confluence": { "base_url": "https://wiki.example.com", "space_key": "DOCS" },
//!   "sync": { "docs_dir": "docs" }
//! }
//! ```
//!
//! Relative paths are resolved against the directory containing the config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use wiki_sync_core::{EngineConfig, ResolutionStrategy, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),

    #[error("Environment variable {0} is not set or empty")]
    MissingToken(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub confluence: ConfluenceConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// Root URL of the Confluence instance
    pub base_url: String,

    /// Key of the space pages are created in
    pub space_key: String,

    /// Name of the environment variable holding the access token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Total attempts per remote call
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Base delay in seconds, doubled after each failed attempt
    #[serde(default = "default_retry_backoff_factor")]
    pub retry_backoff_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory whose markdown tree is mirrored
    pub docs_dir: PathBuf,

    /// Where the file ↔ page mapping is kept
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Queue untracked files on startup
    #[serde(default = "default_true")]
    pub initial_scan: bool,

    /// Seconds between two syncs of the same path
    #[serde(default = "default_debounce_delay")]
    pub debounce_delay: f64,

    #[serde(default)]
    pub conflict_strategy: ResolutionStrategy,
}

fn default_token_env() -> String {
    "CONFLUENCE_TOKEN".to_string()
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_factor() -> f64 {
    1.0
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".wiki-sync/state.json")
}

fn default_true() -> bool {
    true
}

fn default_debounce_delay() -> f64 {
    2.0
}

impl Config {
    /// Read, resolve and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.sync.docs_dir = resolve_path(base, &config.sync.docs_dir);
        config.sync.state_file = resolve_path(base, &config.sync.state_file);

        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Every problem with the configuration, empty when it is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let base_url = &self.confluence.base_url;
        if base_url.is_empty() {
            errors.push("confluence.base_url is required".to_string());
        } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            errors.push("confluence.base_url must start with http:// or https://".to_string());
        }

        if !is_valid_space_key(&self.confluence.space_key) {
            errors.push(format!(
                "confluence.space_key must contain only A-Z, 0-9 and _: {:?}",
                self.confluence.space_key
            ));
        }

        if self.confluence.retry_max_attempts == 0 {
            errors.push("confluence.retry_max_attempts must be at least 1".to_string());
        }
        let backoff = self.confluence.retry_backoff_factor;
        if !backoff.is_finite() || backoff < 0.0 {
            errors.push("confluence.retry_backoff_factor must be a non-negative number".to_string());
        }

        let docs_dir = &self.sync.docs_dir;
        if !docs_dir.exists() {
            errors.push(format!("sync.docs_dir path does not exist: {}", docs_dir.display()));
        } else if !docs_dir.is_dir() {
            errors.push(format!("sync.docs_dir is not a directory: {}", docs_dir.display()));
        }

        let debounce = self.sync.debounce_delay;
        if !debounce.is_finite() || debounce < 0.0 {
            errors.push("sync.debounce_delay must be a non-negative number".to_string());
        }

        errors
    }

    /// Access token from the configured environment variable.
    pub fn token(&self) -> Result<String, ConfigError> {
        self.token_from(|name| std::env::var(name).ok())
    }

    /// Access token looked up through `lookup`.
    pub fn token_from(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        let name = &self.confluence.token_env;
        match lookup(name) {
            Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ConfigError::MissingToken(name.clone())),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.confluence.retry_max_attempts,
            Duration::from_secs_f64(self.confluence.retry_backoff_factor.max(0.0)),
        )
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            docs_dir: self.sync.docs_dir.clone(),
            debounce: self.debounce(),
            conflict_strategy: self.sync.conflict_strategy,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.sync.debounce_delay.max(0.0))
    }
}

fn is_valid_space_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Expand `~` and anchor relative paths at `base`.
fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    let expanded = expand_tilde(&path.to_string_lossy());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}
