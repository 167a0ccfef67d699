//! Byte progress tracking for tree copies.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Thread-safe progress tracker using atomics.
///
/// `bytes_transferred` has a single writer (the walker of the job) and any
/// number of readers. The total is written at most once, by the size estimator.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    bytes_transferred: AtomicU64,
    total_bytes: OnceLock<u64>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish the total size estimate.
    ///
    /// Only the first call takes effect. Returns `false` if an estimate was
    /// already set.
    pub fn set_total(&self, total: u64) -> bool {
        let accepted = self.total_bytes.set(total).is_ok();
        if !accepted {
            log::debug!("Ignoring second size estimate of {total} bytes");
        }
        accepted
    }

    /// Add bytes for a file that has been handled.
    pub fn add_transferred(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Get the total size estimate, if known.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.total_bytes.get().copied()
    }

    /// Get the bytes transferred so far.
    #[must_use]
    pub fn transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::SeqCst)
    }

    /// Fraction complete in `[0, 1]`, or `None` while the total is unknown.
    ///
    /// The copy can overshoot the estimate when the tree changes mid-scan, so
    /// the value is clamped.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        self.total().map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.transferred() as f64 / total as f64).clamp(0.0, 1.0)
            }
        })
    }
}
