//! Error types for sleep prevention.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::process::ExitStatus;

use thiserror::Error;

/// Errors reported by a sleep backend.
///
/// These never abort a transfer; the inhibitor logs and drops them.
#[derive(Debug, Error)]
pub enum PowerError {
    /// The helper program could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        /// Program that was attempted.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The helper program ran but reported failure.
    #[error("{program} exited with {status}")]
    CommandFailed {
        /// Program that was run.
        program: String,
        /// Its exit status.
        status: ExitStatus,
    },

    /// A held inhibitor process could not be stopped.
    #[error("Failed to stop {program}: {source}")]
    Stop {
        /// Program that was running.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
