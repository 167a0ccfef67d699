//! Game library listing.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use serde::Serialize;

use crate::error::EngineError;

/// A game folder in a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Game {
    /// Folder name, also used as the destination folder name.
    pub name: String,
    /// Full path of the folder.
    pub path: PathBuf,
}

/// List the games in a library: every visible folder directly under `root`,
/// sorted by name.
///
/// # Errors
///
/// * If `root` is not a readable directory
pub fn discover_games(root: &Path) -> Result<Vec<Game>, EngineError> {
    let library_error = |message: String| EngineError::Library {
        path: root.to_path_buf(),
        message,
    };

    if !root.is_dir() {
        return Err(library_error("not a directory".to_string()));
    }

    let mut games = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .skip_hidden(true)
        .follow_links(true)
        .sort(true)
    {
        let entry = entry.map_err(|e| library_error(e.to_string()))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        games.push(Game {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path(),
        });
    }

    log::debug!("Found {} games in {}", games.len(), root.display());
    Ok(games)
}
