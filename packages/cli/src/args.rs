//! CLI argument definitions.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use clap::Parser;

/// CLI arguments for game-transfer.
#[derive(Debug, Parser)]
#[command(
    name = "game-transfer",
    about = "Copy games from a remote library to local storage",
    version
)]
pub struct Args {
    /// Remote game library folder (overrides config).
    #[arg(index = 1)]
    pub remote: Option<PathBuf>,

    /// Local folder games are copied into (overrides config).
    #[arg(long = "to", short = 't')]
    pub local: Option<PathBuf>,

    /// Game to copy, matched against folder names (can be specified multiple times).
    #[arg(long = "game", short = 'g')]
    pub games: Vec<String>,

    /// List the games in the remote library and exit.
    #[arg(long)]
    pub list: bool,

    /// Number of games copied at once (overrides config).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Config file to use instead of the default location.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run without prompts, copying every game unless `--game` is given.
    #[arg(long)]
    pub non_interactive: bool,

    /// Disable progress bars (useful for CI environments).
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Print progress snapshots as JSON lines instead of progress bars.
    #[arg(long)]
    pub json: bool,

    /// Do not keep the machine awake while copying.
    #[arg(long = "no-sleep-prevention")]
    pub no_sleep_prevention: bool,

    /// Enable verbose output.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Args {
    /// Determine if we should show progress bars.
    #[must_use]
    pub const fn should_show_progress(&self) -> bool {
        !self.no_progress && !self.json
    }

    /// Worker count override, if given.
    #[must_use]
    pub fn workers_override(&self) -> Option<usize> {
        self.workers.and_then(|w| usize::try_from(w).ok())
    }

    /// Whether `name` is selected by the `--game` filters.
    #[must_use]
    pub fn matches_game(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.games
            .iter()
            .any(|pattern| name.contains(&pattern.to_lowercase()))
    }
}
