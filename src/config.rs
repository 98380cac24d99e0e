//! Splitter configuration
//!
//! Settings live in `auto-split.json` inside the directory the host assigns
//! to the module. The file is created with defaults on first load.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::output::DEFAULT_OUTPUT_KINDS;

/// Settings file name inside the module config directory
pub const SETTINGS_FILENAME: &str = "auto-split.json";

/// Default poll tick
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// On-disk settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Master enable for the watch loop
    pub enable_stop: bool,

    /// Restart into a new file after each split, instead of just stopping
    pub enable_restart: bool,

    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,

    /// Poll tick in milliseconds
    pub poll_interval_ms: u64,

    /// How many times a restart is attempted before giving up
    pub restart_attempts: u32,

    /// Output kinds to check, in priority order
    pub output_kinds: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            enable_stop: true,
            enable_restart: true,
            hours: 0,
            minutes: 10,
            seconds: 0,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            restart_attempts: 3,
            output_kinds: DEFAULT_OUTPUT_KINDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl SplitterConfig {
    /// Settings file path for a module config directory
    pub fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(SETTINGS_FILENAME)
    }

    /// Read settings from `config_dir`, writing the defaults first if the
    /// file does not exist yet.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(config_dir);

        if !path.exists() {
            let config = Self::default();
            config.save(config_dir)?;
            tracing::info!("Created default settings at {:?}", path);
            return Ok(config);
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json { path, source })
    }

    /// Like [`load`](Self::load), but any failure falls back to the defaults.
    pub fn load_or_default(config_dir: &Path) -> Self {
        match Self::load(config_dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Write settings to `config_dir`, creating the directory if needed
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(config_dir).map_err(|source| ConfigError::Io {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let path = Self::path_in(config_dir);
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })
    }

    /// Split threshold. Negative totals clamp to zero.
    pub fn split_duration(&self) -> Duration {
        let total = self
            .hours
            .saturating_mul(3600)
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.seconds);
        Duration::from_secs(total.max(0) as u64)
    }

    /// Poll tick, never shorter than one millisecond
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Restart attempts, at least one
    pub fn max_restart_attempts(&self) -> u32 {
        self.restart_attempts.max(1)
    }
}
