//! Configuration file discovery and TOML loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "CHIRP_CONFIG";

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Platform config directory (`<config_dir>/chirp/config.toml`), if it exists
///
/// Returns `None` when no file applies and built-in defaults should be used.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("chirp").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load a TOML document from `path`.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    debug!("Loaded configuration from {}", path.display());
    Ok(value)
}

/// Resolve and load configuration, falling back to `T::default()`.
pub fn load_or_default<T: DeserializeOwned + Default>(cli_arg: Option<&Path>) -> Result<T> {
    match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
        Some(path) => load_toml(&path),
        None => {
            info!("No configuration file found, using defaults");
            Ok(T::default())
        }
    }
}
