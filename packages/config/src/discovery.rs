//! Configuration file discovery.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::{Path, PathBuf};

/// Directory name under the platform config directory.
pub const CONFIG_DIR_NAME: &str = "game-transfer";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default location of the config file, e.g.
/// `~/.config/game-transfer/config.toml` on Linux.
///
/// Returns `None` if the platform has no config directory.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| config_path_in(&dir))
}

fn config_path_in(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}
