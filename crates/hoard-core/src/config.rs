//! Configuration management for Hoard.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.

use crate::error::{HoardError, Result};
use crate::rank::ScorerChoice;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the entity database inside the data directory.
pub const DATABASE_FILE: &str = "entities.db";

/// Main configuration structure for Hoard.
///
/// ## Example Configuration File (hoard.toml)
///
/// ```toml
/// [general]
/// log_level = "info"
///
/// [storage]
/// path = "/srv/hoard/entities.db"
/// busy_timeout_ms = 5000
///
/// [search]
/// full_text = true
/// fallback_on_empty = true
/// candidate_limit = 50
///
/// [ranking]
/// scorer = "auto"
/// top_n = 20
/// parallel_threshold = 1000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Database location and connection tuning
    pub storage: StorageConfig,

    /// Candidate retrieval
    pub search: SearchConfig,

    /// Fuzzy ranking
    pub ranking: RankingConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            log_level: "info".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file location (None = default location)
    pub path: Option<PathBuf>,

    /// How long a statement waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: None,
            busy_timeout_ms: 5000,
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Use the full-text index when the storage engine supports it
    pub full_text: bool,

    /// Fall through to the substring scan when full-text finds nothing
    pub fallback_on_empty: bool,

    /// Maximum number of candidates handed to the ranker
    pub candidate_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            full_text: true,
            fallback_on_empty: true,
            candidate_limit: 50,
        }
    }
}

/// Ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Scoring strategy
    pub scorer: ScorerChoice,

    /// Number of ranked results to keep
    pub top_n: usize,

    /// Candidate count at which scoring switches to parallel iteration
    pub parallel_threshold: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        RankingConfig {
            scorer: ScorerChoice::Auto,
            top_n: 20,
            parallel_threshold: 1000,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| HoardError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;

        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Render the configuration as it would be saved.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HoardError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "hoard").ok_or_else(|| HoardError::ConfigError {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("hoard.toml"))
    }

    /// Get the default data directory path.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "hoard").ok_or_else(|| HoardError::ConfigError {
            reason: "Could not determine data directory".to_string(),
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the database file path (from config or default).
    ///
    /// The default is `entities.db` in the per-user platform data directory,
    /// not a fixed path beside the installed program, so it stays writable
    /// when the binary lives in a system location.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.storage.path {
            Ok(path.clone())
        } else {
            Ok(Self::default_data_dir()?.join(DATABASE_FILE))
        }
    }
}
