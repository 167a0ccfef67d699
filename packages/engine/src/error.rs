//! Error types for the transfer engine.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use thiserror::Error;

use crate::job::JobId;

/// Errors returned synchronously by the engine.
///
/// Copy failures during a transfer are not returned here; they retire the job
/// as failed and show up in its terminal snapshot.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The destination folder for a game could not be created.
    #[error("Could not create folder {}: {source}", path.display())]
    DestinationSetup {
        /// Folder that was attempted.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The source path has no final component to name the destination after.
    #[error("Invalid source path: {}", path.display())]
    InvalidSource {
        /// The rejected path.
        path: PathBuf,
    },

    /// No job with this id was ever submitted.
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    /// The scheduler has been shut down.
    #[error("Scheduler has been shut down")]
    ShutDown,

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// The progress monitor thread could not be started.
    #[error("Failed to start progress monitor: {0}")]
    Monitor(#[source] std::io::Error),

    /// A game library folder could not be listed.
    #[error("Could not load game list from {}: {message}", path.display())]
    Library {
        /// Library root.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}
