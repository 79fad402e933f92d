//! Configuration loader with tier-based merging.
//!
//! Tiers, lowest to highest: embedded defaults, project `taskdeck/config.yaml`,
//! user `~/.taskdeck/config.yaml`, then environment variables.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    Project = 1,
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project-level config directory
    pub project_dir: Option<PathBuf>,
    /// User-level config directory, also home of the CLI session file
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: TASKDECK_USER_DIR or ~/.taskdeck
        let user_dir = std::env::var("TASKDECK_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".taskdeck")));

        // Project dir: TASKDECK_PROJECT_DIR or $CWD/taskdeck
        let project_dir = std::env::var("TASKDECK_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("taskdeck")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers.
    ///
    /// An explicit path (or `TASKDECK_CONFIG_PATH`) replaces the project and user tiers.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("TASKDECK_CONFIG_PATH").ok().map(PathBuf::from));
        let mut loader = Self::load_with_paths(ConfigPaths::discover(), explicit.as_deref())?;
        apply_env_overrides(&mut loader.config, |key| std::env::var(key).ok());
        Ok(loader)
    }

    /// Load the file tiers with explicit paths. Environment overrides are not applied.
    pub fn load_with_paths(paths: ConfigPaths, explicit: Option<&Path>) -> Result<Self> {
        let mut configs: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut config_path = None;

        if let Some(path) = explicit {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let value: Value = serde_yaml::from_str(&content)
                .with_context(|| format!("invalid YAML in {}", path.display()))?;
            configs.push(value);
            config_path = Some(path.to_path_buf());
        } else {
            let tiers = [
                (ConfigTier::Project, paths.project_dir.as_deref()),
                (ConfigTier::User, paths.user_dir.as_deref()),
            ];
            for (tier, dir) in tiers {
                let Some(dir) = dir else { continue };
                let file = dir.join("config.yaml");
                if let Some(value) = read_tier(&file, tier) {
                    configs.push(value);
                    config_path = Some(file);
                }
            }
        }

        let config: Config = serde_json::from_value(deep_merge_all(configs))?;

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Highest-tier file that contributed to the config, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

fn read_tier(file: &Path, tier: ConfigTier) -> Option<Value> {
    if !file.exists() {
        return None;
    }
    let parsed = std::fs::read_to_string(file)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_yaml::from_str::<Value>(&content).map_err(Into::into));
    match parsed {
        Ok(value) => {
            debug!(tier = %tier, path = %file.display(), "Loaded config tier");
            Some(value)
        }
        Err(e) => {
            warn!(tier = %tier, path = %file.display(), "Ignoring unreadable config: {}", e);
            None
        }
    }
}

/// Apply `TASKDECK_*` overrides using the given variable lookup.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = lookup("TASKDECK_DB_PATH") {
        config.server.db_path = PathBuf::from(db_path);
    }
    if let Some(host) = lookup("TASKDECK_HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("TASKDECK_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!("Ignoring invalid TASKDECK_PORT: {}", port),
        }
    }
    if let Some(origin) = lookup("TASKDECK_CORS_ORIGIN") {
        config.server.cors_origin = origin;
    }
    if let Some(secret) = lookup("TASKDECK_ACCESS_SECRET") {
        config.auth.access_secret = secret;
    }
    if let Some(secret) = lookup("TASKDECK_REFRESH_SECRET") {
        config.auth.refresh_secret = secret;
    }
    if let Some(url) = lookup("TASKDECK_API_URL") {
        config.client.base_url = url;
    }
}
