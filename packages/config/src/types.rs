//! Configuration types for game-transfer.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const fn default_workers() -> usize {
    2
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_enabled() -> bool {
    true
}

const fn default_standby_timeout_minutes() -> u32 {
    30
}

/// Transfer scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineSettings {
    /// Number of games copied at once.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Progress refresh interval in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl EngineSettings {
    /// Progress refresh interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// System sleep prevention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PowerSettings {
    /// Whether to keep the machine awake while copying.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Standby timeout restored afterwards on Windows, in minutes.
    #[serde(default = "default_standby_timeout_minutes")]
    pub standby_timeout_minutes: u32,
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            standby_timeout_minutes: default_standby_timeout_minutes(),
        }
    }
}

/// Where games are copied from and to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LibrarySettings {
    /// Folder holding the remote game library.
    #[serde(default)]
    pub remote_root: Option<PathBuf>,

    /// Folder games are installed into.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
}

/// game-transfer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Scheduling settings.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Sleep prevention settings.
    #[serde(default)]
    pub power: PowerSettings,

    /// Library locations.
    #[serde(default)]
    pub library: LibrarySettings,
}

impl Config {
    /// Check values that parse but make no sense.
    ///
    /// # Errors
    ///
    /// * If `engine.workers` or `engine.tick-interval-ms` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.workers",
                message: "must be at least 1".to_string(),
            });
        }
        if self.engine.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.tick-interval-ms",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A loaded configuration with metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The parsed configuration.
    pub config: Config,
    /// File the configuration came from, if any.
    pub config_path: Option<PathBuf>,
}
