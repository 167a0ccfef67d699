//! Resumable, cancellable directory tree copying with byte progress tracking.
//!
//! This crate provides the filesystem half of a game transfer:
//!
//! * A [`FileSystem`] trait with a local implementation
//! * Tree copying that skips files already present at the target
//! * Cooperative cancellation checked at every directory and file
//! * Atomic byte counters shared with progress readers
//! * Best-effort size estimation using `jwalk`
//!
//! # Example
//!
//! ```rust,ignore
//! use game_transfer_copy::{CancelToken, LocalFileSystem, ProgressTracker, copy_tree};
//!
//! let tracker = ProgressTracker::new();
//! let cancel = CancelToken::new();
//!
//! copy_tree(&LocalFileSystem, source, target, &tracker, &cancel)?;
//! println!("{} bytes transferred", tracker.transferred());
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod cancel;
mod error;
mod fs;
mod progress;
mod size;
mod walker;

pub use cancel::CancelToken;
pub use error::CopyError;
pub use fs::{DirEntry, EntryKind, FileSystem, LocalFileSystem, partial_path};
pub use progress::ProgressTracker;
pub use size::estimate_tree_size;
pub use walker::{CopyResult, CopyStats, copy_tree};
