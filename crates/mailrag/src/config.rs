//! Configuration loading for mailrag tools
//!
//! Settings are loaded from (in order of priority):
//! 1. JSON file (~/.config/mailrag/mailrag.json)
//! 2. Runtime environment variables
//! 3. Built-in defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::reply::ExtractionStrategy;

/// Config filename in the mailrag config directory
pub const CONFIG_FILE: &str = "mailrag.json";

/// Environment variable selecting the extraction strategy
pub const STRATEGY_ENV: &str = "MAILRAG_STRATEGY";
/// Environment variable pointing at the SQLite database
pub const DATABASE_ENV: &str = "MAILRAG_DB";

/// Default database filename inside the data directory
const DATABASE_FILE: &str = "threads.sqlite";

/// Settings shared by mailrag tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Reply extraction strategy
    pub strategy: ExtractionStrategy,
    /// SQLite database holding thread trees
    pub database_path: Option<PathBuf>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            strategy: ExtractionStrategy::default(),
            database_path: default_database_path(),
        }
    }
}

impl RagConfig {
    /// Load settings using the following priority:
    /// 1. JSON file (~/.config/mailrag/mailrag.json)
    /// 2. Runtime environment variables
    /// 3. Defaults
    pub fn load() -> Result<Self> {
        if config::config_exists(CONFIG_FILE) {
            return config::load_json(CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse mailrag config JSON")
    }

    /// Load settings from environment variables, defaulting what is unset
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var(STRATEGY_ENV).ok(),
            std::env::var(DATABASE_ENV).ok(),
        )
    }

    fn from_vars(strategy: Option<String>, database: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(strategy) = strategy.filter(|s| !s.trim().is_empty()) {
            config.strategy = strategy
                .parse()
                .with_context(|| format!("Invalid {} value", STRATEGY_ENV))?;
        }

        if let Some(database) = database.filter(|s| !s.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(database));
        }

        Ok(config)
    }

    /// Save settings to ~/.config/mailrag/mailrag.json
    pub fn save(&self) -> Result<()> {
        config::save_json(CONFIG_FILE, self)
    }
}

/// Default database location (~/.local/share/mailrag/threads.sqlite on Linux)
pub fn default_database_path() -> Option<PathBuf> {
    config::data_dir().map(|p| p.join(DATABASE_FILE))
}
