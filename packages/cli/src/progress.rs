//! Progress bar utilities for the CLI.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::collections::HashMap;
use std::io::Write;

use game_transfer_engine::{JobId, ProgressSnapshot};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::output;

/// Bar length; positions are per-mille of the job.
const BAR_LENGTH: u64 = 1000;

/// One progress bar per transfer, driven by snapshots.
pub struct ProgressManager {
    multi: MultiProgress,
    bars: HashMap<JobId, ProgressBar>,
    enabled: bool,
}

impl ProgressManager {
    /// Create a new progress manager.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            enabled,
        }
    }

    /// Add a bar for a submitted job.
    ///
    /// If progress is disabled, the bar is hidden.
    pub fn add_job(&mut self, id: JobId, name: &str) {
        let bar = if self.enabled {
            let bar = self.multi.add(ProgressBar::new(BAR_LENGTH));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {prefix:<30} [{bar:25.green/dim}] {msg}")
                    .expect("Invalid progress bar template")
                    .progress_chars("━━─"),
            );
            bar.set_prefix(name.to_string());
            bar
        } else {
            ProgressBar::hidden()
        };

        self.bars.insert(id, bar);
    }

    /// Apply a snapshot to its job's bar.
    ///
    /// Terminal snapshots remove the bar and print a result line in its place.
    pub fn update(&mut self, snapshot: &ProgressSnapshot) {
        if snapshot.is_terminal() {
            if let Some(bar) = self.bars.remove(&snapshot.job_id) {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
            self.multi.suspend(|| output::print_result(snapshot));
            // Flush to ensure output appears immediately
            let _ = std::io::stdout().flush();
            return;
        }

        if let Some(bar) = self.bars.get(&snapshot.job_id) {
            bar.set_position(bar_position(snapshot.fraction));
            bar.set_message(snapshot.describe());
        }
    }

    /// Clear any active progress bars (for clean output after completion).
    pub fn clear(&self) {
        self.multi.clear().ok();
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bar_position(fraction: Option<f64>) -> u64 {
    let fraction = fraction.unwrap_or(0.0).clamp(0.0, 1.0);
    (fraction * BAR_LENGTH as f64).round() as u64
}
