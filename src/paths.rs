//! Centralized path resolution for hostprov
//!
//! # Environment Variables
//!
//! - `HOSTPROV_CONFIG_DIR` - Override config directory (settings)
//! - `HOSTPROV_DATA_DIR` - Override data directory (cluster inventories, fetched keys)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `HOSTPROV_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/hostprov` (if set)
//! 3. Default: `~/.config/hostprov`
//!
//! For data_dir():
//! 1. `HOSTPROV_DATA_DIR` environment variable
//! 2. `XDG_DATA_HOME/hostprov` (if set)
//! 3. Default: `~/.local/share/hostprov`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "HOSTPROV_CONFIG_DIR";

/// Environment variable for data directory override
pub const ENV_DATA_DIR: &str = "HOSTPROV_DATA_DIR";

/// Get the hostprov config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("hostprov");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("hostprov");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the hostprov data directory path
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        let path = expand(&dir);
        log::debug!("Using data dir from {}: {}", ENV_DATA_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        let path = PathBuf::from(xdg_data).join("hostprov");
        log::debug!("Using XDG_DATA_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("share").join("hostprov");
    log::debug!("Using default data dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
