//! Periodic progress sampling.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};

use crate::scheduler::Shared;

/// The single thread that samples every known job once per tick.
///
/// Sampling runs under the scheduler lock, the same lock retirement takes, so
/// a job never produces a snapshot after its terminal one.
#[derive(Debug)]
pub(crate) struct ProgressMonitor {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start sampling every `interval`.
    pub(crate) fn spawn(shared: Arc<Shared>, interval: Duration) -> io::Result<Self> {
        let (stop, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("progress-monitor".to_string())
            .spawn(move || {
                log::debug!("Progress monitor started, interval {interval:?}");
                let ticker = tick(interval);

                loop {
                    select! {
                        recv(ticker) -> _ => shared.publish_samples(),
                        recv(stop_rx) -> _ => break,
                    }
                }

                log::debug!("Progress monitor stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop sampling and wait for the thread to exit.
    pub(crate) fn stop(mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Progress monitor thread panicked");
            }
        }
    }
}
