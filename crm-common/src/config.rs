//! Configuration loading and resolution
//!
//! Bootstrap configuration comes from a TOML file, resolved in this order:
//! 1. Command-line argument (highest priority)
//! 2. `CRM_CONFIG` environment variable
//! 3. `<config dir>/crm/<module>.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file is never fatal: the service logs a warning and starts on
//! defaults. A file that exists but cannot be read or parsed is an error.
//! Selected keys can then be overridden from the environment.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CRM_CONFIG";

/// Environment variable overriding the remote store base URL
pub const REMOTE_BASE_URL_ENV_VAR: &str = "CRM_REMOTE_BASE_URL";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote record store (the CRM REST API)
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Event bus sizing
    #[serde(default)]
    pub events: EventsConfig,

    /// Import session lifetime
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Default: 5780
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Remote record store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the CRM REST API, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout applied by the HTTP client
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Event bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

/// Import session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle seconds before a session that is not committing is evicted
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_capacity() -> usize {
    100
}

fn default_retention_seconds() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            retention_seconds: default_retention_seconds(),
        }
    }
}

impl TomlConfig {
    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply environment overrides on top of file/default values
    ///
    /// `port_env_var` is module specific (e.g. `CRM_IMPORT_PORT`). Invalid
    /// port values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, port_env_var: &str) {
        if let Ok(port) = std::env::var(port_env_var) {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid {}={:?}", port_env_var, port),
            }
        }

        if let Ok(base_url) = std::env::var(REMOTE_BASE_URL_ENV_VAR) {
            if !base_url.trim().is_empty() {
                self.remote.base_url = base_url.trim().trim_end_matches('/').to_string();
            }
        }
    }
}

/// Resolves and loads the configuration of one service module
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    module_name: String,
}

impl ConfigResolver {
    /// Create a resolver for a module (e.g. "crm-import")
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
        }
    }

    /// Name of the environment variable overriding this module's port
    ///
    /// "crm-import" → "CRM_IMPORT_PORT"
    pub fn port_env_var(&self) -> String {
        format!("{}_PORT", self.module_name.to_uppercase().replace('-', "_"))
    }

    /// Default config file location for this module, if the platform has one
    pub fn default_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("crm").join(format!("{}.toml", self.module_name)))
    }

    /// Resolve the config file path (CLI → ENV → default location)
    pub fn config_path(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        self.default_config_path()
    }

    /// Load the effective configuration
    ///
    /// Missing file → defaults. Environment overrides are always applied.
    pub fn load(&self, cli_arg: Option<&Path>) -> Result<TomlConfig> {
        let mut config = match self.config_path(cli_arg) {
            Some(path) if path.exists() => {
                let config = load_toml_config(&path)?;
                info!("Configuration loaded from {}", path.display());
                config
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                warn!("No config directory available, using built-in defaults");
                TomlConfig::default()
            }
        };

        config.apply_env_overrides(&self.port_env_var());
        Ok(config)
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}
