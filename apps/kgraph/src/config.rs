//! # Configuration
//!
//! Settings come from three layers, later ones winning:
//! 1. `kgraph.toml` (or the file given with `--config`)
//! 2. environment: `KGRAPH_DB`, `KGRAPH_BACKEND`, `KGRAPH_LOG_FORMAT`
//! 3. command-line flags
//!
//! ```toml
//! [store]
//! backend = "redb"
//! path = "kgraph.redb"
//!
//! [bootstrap]
//! attempts = 5
//! backoff_ms = 2000
//!
//! [classifier]
//! rules = [{ keyword = "married", kind = "MARRIED_TO" }]
//!
//! [log]
//! format = "text"
//! filter = "kgraph=info,kgraph_core=info"
//! ```

use clap::ValueEnum;
use kgraph_core::{KeywordClassifier, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "kgraph.toml";

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "kgraph.redb";

pub const ENV_DB: &str = "KGRAPH_DB";
pub const ENV_BACKEND: &str = "KGRAPH_BACKEND";
pub const ENV_LOG_FORMAT: &str = "KGRAPH_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Disk-backed redb database.
    #[default]
    Redb,
    /// Volatile in-memory graph, discarded when the command exits.
    Memory,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: "store.backend".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redb => f.write_str("redb"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                key: "log.format".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: "kgraph=info,kgraph_core=info".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub bootstrap: RetryPolicy,
    pub classifier: KeywordClassifier,
    pub log: LogConfig,
}

impl Config {
    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load the config file.
    ///
    /// An explicit path must exist. Without one, `kgraph.toml` in the working
    /// directory is used when present, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup(ENV_DB).filter(|v| !v.is_empty()) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(backend) = lookup(ENV_BACKEND).filter(|v| !v.is_empty()) {
            self.store.backend = backend.parse()?;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT).filter(|v| !v.is_empty()) {
            self.log.format = format.parse()?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }
}
