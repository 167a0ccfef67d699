//! Transfer jobs and their lifecycle states.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use game_transfer_copy::{CancelToken, ProgressTracker};
use serde::Serialize;

/// Identifier of a submitted job, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// `Running` covers copying and size estimation, which proceed together.
/// There is no paused state: a queued job is merely displayed as paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    /// Waiting for a free worker.
    Queued,
    /// Copying on a worker.
    Running,
    /// Every entry was visited.
    Completed,
    /// Cancelled before or during the copy.
    Cancelled,
    /// The copy hit an IO error.
    Failed,
}

impl JobState {
    /// Returns true if this state is terminal (no further changes expected).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a job left the running state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl JobOutcome {
    pub(crate) const fn state(&self) -> JobState {
        match self {
            Self::Completed => JobState::Completed,
            Self::Cancelled => JobState::Cancelled,
            Self::Failed(_) => JobState::Failed,
        }
    }
}

/// One game copy: a source tree, its destination and shared progress.
///
/// The walker writes `bytes_transferred` and the size estimator writes the
/// total; both live in the shared [`ProgressTracker`].
#[derive(Debug)]
pub struct TransferJob {
    id: JobId,
    name: String,
    source: PathBuf,
    destination: PathBuf,
    tracker: Arc<ProgressTracker>,
    cancel: CancelToken,
    size_cancel: CancelToken,
    started_at: OnceLock<Instant>,
    finished_at: OnceLock<Instant>,
}

impl TransferJob {
    pub(crate) fn new(id: JobId, name: String, source: PathBuf, destination: PathBuf) -> Self {
        Self {
            id,
            name,
            source,
            destination,
            tracker: ProgressTracker::new(),
            cancel: CancelToken::new(),
            size_cancel: CancelToken::new(),
            started_at: OnceLock::new(),
            finished_at: OnceLock::new(),
        }
    }

    /// Job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Game name (the source folder name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source tree being copied.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination folder, `<destination root>/<name>`.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Shared progress counters.
    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Token checked by the walker.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Token checked by the size estimator.
    #[must_use]
    pub const fn size_cancel_token(&self) -> &CancelToken {
        &self.size_cancel
    }

    /// Request cancellation of both the copy and the size estimation.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.size_cancel.cancel();
    }

    /// When a worker began the job.
    #[must_use]
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at.get().copied()
    }

    /// Time spent running: up to now while running, up to retirement after.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at()?;
        let end = self.finished_at.get().copied().unwrap_or_else(Instant::now);
        Some(end.saturating_duration_since(started))
    }

    pub(crate) fn mark_started(&self) {
        let _ = self.started_at.set(Instant::now());
    }

    /// Record retirement and stop any size estimation still in flight.
    pub(crate) fn mark_finished(&self) {
        let _ = self.finished_at.set(Instant::now());
        self.size_cancel.cancel();
    }
}
