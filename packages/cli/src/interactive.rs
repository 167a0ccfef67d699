//! Interactive prompts using dialoguer.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::io;
use std::path::PathBuf;

use dialoguer::{Input, MultiSelect};
use game_transfer_engine::Game;

/// Select which games to copy.
///
/// # Errors
///
/// * If the user cancels the selection
pub fn select_games(games: &[Game]) -> io::Result<Vec<usize>> {
    if games.len() == 1 {
        // If there's only one game, auto-select it
        return Ok(vec![0]);
    }

    let items: Vec<&str> = games.iter().map(|g| g.name.as_str()).collect();

    let selections = MultiSelect::new()
        .with_prompt("Select games to copy (space to toggle, enter to confirm)")
        .items(&items)
        .interact()?;

    Ok(selections)
}

/// Prompt for a folder path.
///
/// # Errors
///
/// * If the user cancels the input
pub fn prompt_folder(prompt: &str) -> io::Result<PathBuf> {
    let path: String = Input::new().with_prompt(prompt).interact_text()?;

    Ok(PathBuf::from(path))
}
