//! Configuration loading for game-transfer.
//!
//! This crate provides configuration types and loading functionality for the
//! game-transfer CLI. Configuration is a single optional TOML file; every
//! setting has a default.
//!
//! # Example
//!
//! ```rust,ignore
//! use game_transfer_config::load_config;
//!
//! let loaded = load_config(None)?;
//! println!("{} workers", loaded.config.engine.workers);
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod discovery;
mod error;
mod toml_loader;
mod types;

pub use discovery::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, default_config_path};
pub use error::ConfigError;
pub use toml_loader::load_toml_config;
pub use types::{Config, EngineSettings, LibrarySettings, LoadedConfig, PowerSettings};

use std::path::Path;

/// Load the configuration.
///
/// An explicit `path` must exist. Without one, the default location is used
/// if a file is there and built-in defaults otherwise.
///
/// # Arguments
///
/// * `path` - Config file given on the command line, if any
///
/// # Errors
///
/// * If the file cannot be read
/// * If the file cannot be parsed
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = path {
        return Ok(LoadedConfig {
            config: load_toml_config(path)?,
            config_path: Some(path.to_path_buf()),
        });
    }

    let Some(default_path) = default_config_path() else {
        log::debug!("No config directory on this platform; using defaults");
        return Ok(LoadedConfig {
            config: Config::default(),
            config_path: None,
        });
    };

    if !default_path.try_exists()? {
        log::debug!(
            "No config at {}; using defaults",
            default_path.display()
        );
        return Ok(LoadedConfig {
            config: Config::default(),
            config_path: None,
        });
    }

    Ok(LoadedConfig {
        config: load_toml_config(&default_path)?,
        config_path: Some(default_path),
    })
}
