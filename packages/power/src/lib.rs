//! System sleep prevention for game-transfer.
//!
//! This crate keeps the machine awake while transfers run:
//!
//! * A [`SleepBackend`] trait with `powercfg`, `systemd-inhibit` and
//!   `caffeinate` implementations
//! * A reference-counted [`SleepInhibitor`] shared by all running transfers
//!
//! # Example
//!
//! ```rust,ignore
//! use game_transfer_power::{SleepInhibitor, default_backend};
//!
//! let inhibitor = SleepInhibitor::new(default_backend(30));
//!
//! inhibitor.acquire();
//! // ... transfer ...
//! inhibitor.release();
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod backend;
mod error;
mod inhibitor;

pub use backend::{
    CommandBackend, CommandSpec, InhibitorBackend, NoopBackend, SleepBackend, default_backend,
};
pub use error::PowerError;
pub use inhibitor::SleepInhibitor;
