//! Layered configuration.
//!
//! Consolidates configuration from tiers with field-by-field YAML merging:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/taskdeck/config.yaml`
//! 3. **User** - `~/.taskdeck/config.yaml`
//! 4. **Environment** - `TASKDECK_*` variables
//!
//! ## Environment Variables
//! - `TASKDECK_CONFIG_PATH` - Explicit config file (replaces project and user tiers)
//! - `TASKDECK_DB_PATH`, `TASKDECK_HOST`, `TASKDECK_PORT`, `TASKDECK_CORS_ORIGIN`
//! - `TASKDECK_ACCESS_SECRET`, `TASKDECK_REFRESH_SECRET`
//! - `TASKDECK_API_URL` - Base URL used by the CLI client
//! - `TASKDECK_USER_DIR` / `TASKDECK_PROJECT_DIR` - Tier directories

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier, apply_env_overrides};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
