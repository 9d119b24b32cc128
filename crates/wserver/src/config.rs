//! Server configuration (TOML file plus command-line overrides).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wserver_fanout::FanoutMode;
use wserver_protocol::defaults::{
    DEFAULT_CORE_CONNECT_TIMEOUT_MS, DEFAULT_CORE_LOGIN, DEFAULT_CORE_PASSWORD, DEFAULT_CORE_PORT,
    DEFAULT_CORE_REQUEST_TIMEOUT_MS, DEFAULT_DATABASE_URL, DEFAULT_PHOTOS_DIR,
    DEFAULT_RPC_BIND_ADDR,
};
use wserver_protocol::CoreAuth;

/// Main configuration for WServer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WServerConfig {
    /// ZMQ endpoint the RPC socket binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// GDB connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Where act photos are written
    #[serde(default = "default_photos_dir")]
    pub photos_dir: PathBuf,

    /// Whether destinations are contacted one by one or all at once
    #[serde(default)]
    pub fanout_mode: FanoutMode,

    /// Core node client settings
    #[serde(default)]
    pub core: CoreConfig,
}

/// How WServer talks to core nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_core_port")]
    pub port: u16,

    #[serde(default = "default_core_login")]
    pub login: String,

    #[serde(default = "default_core_password")]
    pub password: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_bind_addr() -> String {
    DEFAULT_RPC_BIND_ADDR.to_string()
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_photos_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PHOTOS_DIR)
}

fn default_core_port() -> u16 {
    DEFAULT_CORE_PORT
}

fn default_core_login() -> String {
    DEFAULT_CORE_LOGIN.to_string()
}

fn default_core_password() -> String {
    DEFAULT_CORE_PASSWORD.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CORE_CONNECT_TIMEOUT_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_CORE_REQUEST_TIMEOUT_MS
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            port: default_core_port(),
            login: default_core_login(),
            password: default_core_password(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl CoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn auth(&self) -> CoreAuth {
        CoreAuth {
            login: self.login.clone(),
            password: self.password.clone(),
        }
    }
}

impl Default for WServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_url: default_database_url(),
            photos_dir: default_photos_dir(),
            fanout_mode: FanoutMode::default(),
            core: CoreConfig::default(),
        }
    }
}

impl WServerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
