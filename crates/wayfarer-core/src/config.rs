//! Application configuration management.
//!
//! Holds the push-event server URL, the optional API token and the snapshot
//! expiry. Configuration is stored at `~/.config/wayfarer/config.json`;
//! `WAYFARER_SERVER_URL` and `WAYFARER_TOKEN` override the stored values.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_MAX_AGE_HOURS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "wayfarer";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const SERVER_URL_ENV: &str = "WAYFARER_SERVER_URL";
const TOKEN_ENV: &str = "WAYFARER_TOKEN";

fn default_max_age_hours() -> i64 {
    DEFAULT_MAX_AGE_HOURS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_url: Option<String>,
    pub api_token: Option<String>,
    #[serde(default = "default_max_age_hours")]
    pub snapshot_max_age_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            api_token: None,
            snapshot_max_age_hours: DEFAULT_MAX_AGE_HOURS,
        }
    }
}

impl Config {
    /// Load from disk (defaults if absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.server_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.api_token = Some(token);
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
