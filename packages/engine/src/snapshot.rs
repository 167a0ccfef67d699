//! Progress snapshots delivered to presentation layers.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;

use serde::Serialize;

use crate::job::{JobId, JobOutcome, JobState, TransferJob};

const BYTES_IN_GIB: f64 = 1_073_741_824.0;

/// What a job is doing, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    /// Queued behind other transfers.
    Waiting,
    /// Running, total size not known yet.
    Sizing,
    /// Running with a size estimate.
    Copying,
    /// Finished.
    Done,
    /// Cancelled.
    Cancelled,
    /// Failed with an IO error.
    Failed,
}

/// Point-in-time view of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Job this snapshot describes.
    pub job_id: JobId,
    /// Game name.
    pub name: String,
    /// Display status.
    pub status: ProgressStatus,
    /// Fraction complete in `[0, 1]`; `None` means indeterminate.
    pub fraction: Option<f64>,
    /// Bytes handled so far.
    pub bytes_transferred: u64,
    /// Size estimate, once known.
    pub total_bytes: Option<u64>,
    /// Running time since a worker picked the job up.
    pub elapsed: Option<Duration>,
    /// Failure message for failed jobs.
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Sample a job that is still queued or running.
    pub(crate) fn sample(job: &TransferJob, state: JobState) -> Self {
        let tracker = job.tracker();
        let (status, fraction) = match state {
            JobState::Queued => (ProgressStatus::Waiting, Some(0.0)),
            JobState::Running => tracker.fraction().map_or(
                (ProgressStatus::Sizing, None),
                |fraction| (ProgressStatus::Copying, Some(fraction)),
            ),
            JobState::Completed => (ProgressStatus::Done, Some(1.0)),
            JobState::Cancelled => (ProgressStatus::Cancelled, tracker.fraction()),
            JobState::Failed => (ProgressStatus::Failed, tracker.fraction()),
        };

        Self {
            job_id: job.id(),
            name: job.name().to_string(),
            status,
            fraction,
            bytes_transferred: tracker.transferred(),
            total_bytes: tracker.total(),
            elapsed: job.elapsed(),
            error: None,
        }
    }

    /// Final snapshot for a retired job.
    pub(crate) fn terminal(job: &TransferJob, outcome: &JobOutcome) -> Self {
        let mut snapshot = Self::sample(job, outcome.state());
        if let JobOutcome::Failed(message) = outcome {
            snapshot.error = Some(message.clone());
        }
        snapshot
    }

    /// Whether this is the last snapshot the job will produce.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProgressStatus::Done | ProgressStatus::Cancelled | ProgressStatus::Failed
        )
    }

    /// Human readable progress line.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn describe(&self) -> String {
        let transferred = self.bytes_transferred as f64 / BYTES_IN_GIB;

        match self.status {
            ProgressStatus::Waiting => "Paused, waiting for others to complete".to_string(),
            ProgressStatus::Sizing => "Calculating size of game...".to_string(),
            ProgressStatus::Copying => {
                let percent = self.fraction.unwrap_or(0.0) * 100.0;
                let total = self.total_bytes.unwrap_or(0) as f64 / BYTES_IN_GIB;
                format!("{percent:.1}% {transferred:.2}/{total:.2} GB")
            }
            ProgressStatus::Done => {
                let mut line = self.total_bytes.map_or_else(
                    || format!("100% {transferred:.2} GB"),
                    |total| {
                        let total = total as f64 / BYTES_IN_GIB;
                        format!("100.0% {total:.2}/{total:.2} GB")
                    },
                );
                if let Some(elapsed) = self.elapsed {
                    line.push_str("; finished in ");
                    line.push_str(&format_duration(elapsed));
                }
                line
            }
            ProgressStatus::Cancelled => "Cancelled".to_string(),
            ProgressStatus::Failed => format!(
                "Failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Format a duration as `H:MM:SS`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let s = duration.as_secs();
    format!("{}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}
