//! User settings (`config.toml` in the config directory)

use anyhow::{Context, Result};
use converge::ServiceManager;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SETTINGS_FILE: &str = "config.toml";

fn default_true() -> bool {
    true
}

fn default_jobs() -> usize {
    4
}

/// Defaults applied to every run, overridable from the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// How services are queried and driven on targets
    #[serde(default)]
    pub service_manager: ServiceManager,

    /// Stop a run at the first failed task
    #[serde(default = "default_true")]
    pub stop_on_failure: bool,

    /// Parallel jobs when several roots are given
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_manager: ServiceManager::default(),
            stop_on_failure: true,
            jobs: default_jobs(),
        }
    }
}

impl Settings {
    /// Load settings from `dir`, or return defaults if the file doesn't exist
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;

        if settings.jobs == 0 {
            anyhow::bail!("{}: jobs must be at least 1", path.display());
        }

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load settings from the config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&crate::paths::config_dir()?)
    }
}
