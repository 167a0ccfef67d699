//! Transfer scheduling for game-transfer.
//!
//! This crate turns tree copies into managed jobs:
//!
//! * A bounded [`Scheduler`] that runs at most `workers` transfers at once
//!   and queues the rest in submission order
//! * Per-job cancellation, before or during the copy
//! * A progress monitor that publishes [`ProgressSnapshot`]s once per tick
//! * Sleep prevention held while any transfer runs
//! * Game library listing
//!
//! # Example
//!
//! ```rust,ignore
//! use game_transfer_engine::{EngineOptions, Scheduler};
//! use game_transfer_power::default_backend;
//!
//! let scheduler = Scheduler::local(default_backend(30), EngineOptions::default())?;
//! let id = scheduler.submit("/mnt/remote/Portal", "/games")?;
//!
//! for snapshot in scheduler.subscribe(id)? {
//!     println!("{}: {}", snapshot.name, snapshot.describe());
//! }
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod error;
mod job;
mod library;
mod monitor;
mod scheduler;
mod snapshot;

#[cfg(test)]
mod test_support;

pub use error::EngineError;
pub use job::{JobId, JobState, TransferJob};
pub use library::{Game, discover_games};
pub use scheduler::{
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TICK_INTERVAL, DEFAULT_WORKERS, EngineOptions,
    MIN_TICK_INTERVAL, RETIRED_LIMIT, Scheduler,
};
pub use snapshot::{ProgressSnapshot, ProgressStatus, format_duration};
