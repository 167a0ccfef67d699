//! Terminal output formatting.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::Path;

use colored::Colorize;
use game_transfer_engine::{Game, ProgressSnapshot, ProgressStatus};

/// Print a header message.
pub fn print_header(message: &str) {
    println!("\n{} {}\n", "🎮", message.bold());
}

/// Print source and destination folders.
pub fn print_library_info(remote: &Path, local: &Path) {
    println!("From: {}", remote.display().to_string().cyan());
    println!("To:   {}", local.display().to_string().cyan());
}

/// Print the games found in the remote library.
pub fn print_game_list(games: &[Game]) {
    println!(
        "Found {} game{}:",
        games.len(),
        if games.len() == 1 { "" } else { "s" }
    );
    for game in games {
        println!("  {} {}", "•".dimmed(), game.name.yellow());
    }
    println!();
}

/// Print the final line for one job.
pub fn print_result(snapshot: &ProgressSnapshot) {
    let mark = match snapshot.status {
        ProgressStatus::Done => "✓".green(),
        ProgressStatus::Failed => "✗".red(),
        _ => "•".dimmed(),
    };
    println!(
        "{} {:<30} {}",
        mark,
        snapshot.name,
        snapshot.describe().dimmed()
    );
}

/// Print summary line.
pub fn print_summary(done: usize, failed: usize, cancelled: usize) {
    if failed == 0 && cancelled == 0 {
        println!("{} {done} game(s) copied", "✅");
    } else {
        println!(
            "{} {done} copied, {failed} failed, {cancelled} cancelled",
            "Finished:".bold()
        );
    }
}

/// Print error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}
