//! Configuration types and structures.

use crate::types::DEFAULT_LIMIT;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port for the API server.
pub const DEFAULT_PORT: u16 = 8080;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind (default: 127.0.0.1).
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Allowed CORS origin for browser clients.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskdeck/taskdeck.db")
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Session token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret for signing access tokens.
    #[serde(default = "default_access_secret")]
    pub access_secret: String,

    /// Secret for signing refresh tokens.
    #[serde(default = "default_refresh_secret")]
    pub refresh_secret: String,

    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds (default: 604800 = 7 days).
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,

    /// Mark session cookies `Secure` (enable behind HTTPS).
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: default_access_secret(),
            refresh_secret: default_refresh_secret(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            secure_cookies: false,
        }
    }
}

const DEV_ACCESS_SECRET: &str = "taskdeck-dev-access-secret";
const DEV_REFRESH_SECRET: &str = "taskdeck-dev-refresh-secret";

fn default_access_secret() -> String {
    DEV_ACCESS_SECRET.to_string()
}

fn default_refresh_secret() -> String {
    DEV_REFRESH_SECRET.to_string()
}

fn default_access_ttl() -> u64 {
    15 * 60
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 60 * 60
}

impl AuthConfig {
    /// Whether the built-in development secrets are still in use.
    pub fn uses_dev_secrets(&self) -> bool {
        self.access_secret == DEV_ACCESS_SECRET || self.refresh_secret == DEV_REFRESH_SECRET
    }
}

/// Client-side configuration used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the API server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Page size used when none is given.
    #[serde(default = "default_limit")]
    pub default_limit: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_limit: default_limit(),
        }
    }
}

fn default_base_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_PORT)
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Socket address string the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str("server:\n  port: 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.auth.access_ttl_secs, 900);
        assert_eq!(config.client.default_limit, 10);
    }

    #[test]
    fn default_secrets_are_flagged() {
        assert!(AuthConfig::default().uses_dev_secrets());
        let custom = AuthConfig {
            access_secret: "a".into(),
            refresh_secret: "b".into(),
            ..AuthConfig::default()
        };
        assert!(!custom.uses_dev_secrets());
    }
}
