//! Reference-counted sleep prevention.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::backend::SleepBackend;

#[derive(Debug, Default)]
struct InhibitorState {
    holders: usize,
    closed: bool,
}

/// Process-wide "keep the system awake" switch shared by all transfers.
///
/// Each running transfer holds one reference. The backend is only called on
/// the 0 → 1 and 1 → 0 transitions, under a single lock, so the OS setting
/// is always either fully applied or fully reverted. Backend failures are
/// logged and never surface to callers.
pub struct SleepInhibitor {
    backend: Box<dyn SleepBackend>,
    state: Mutex<InhibitorState>,
}

impl SleepInhibitor {
    /// Create an inhibitor over `backend`. Sleep is not prevented yet.
    #[must_use]
    pub fn new(backend: Box<dyn SleepBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(InhibitorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InhibitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a reference, preventing sleep if this is the first one.
    ///
    /// Does nothing after [`Self::shutdown`].
    pub fn acquire(&self) {
        let mut state = self.lock();
        if state.closed {
            log::debug!("Sleep inhibitor shut down; ignoring acquire");
            return;
        }

        state.holders += 1;
        if state.holders == 1 {
            log::info!("Preventing system sleep");
            if let Err(e) = self.backend.prevent_sleep() {
                log::warn!("Could not prevent sleep, continuing anyway: {e}");
            }
        }
    }

    /// Drop a reference, allowing sleep once none remain.
    ///
    /// Releasing with no references held is a no-op.
    pub fn release(&self) {
        let mut state = self.lock();
        if state.holders == 0 {
            log::debug!("Sleep inhibitor not held; ignoring release");
            return;
        }

        state.holders -= 1;
        if state.holders == 0 {
            log::info!("Allowing system sleep");
            if let Err(e) = self.backend.allow_sleep() {
                log::warn!("Could not allow sleep: {e}");
            }
        }
    }

    /// Drop every reference and allow sleep, regardless of how many are held.
    ///
    /// Later calls to [`Self::acquire`] are ignored. Calling this more than
    /// once only has an effect the first time.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }

        state.closed = true;
        state.holders = 0;
        log::debug!("Shutting down sleep inhibitor");
        if let Err(e) = self.backend.allow_sleep() {
            log::warn!("Could not allow sleep: {e}");
        }
    }

    /// Number of references currently held.
    #[must_use]
    pub fn holders(&self) -> usize {
        self.lock().holders
    }

    /// Whether sleep is currently being prevented.
    #[must_use]
    pub fn is_preventing(&self) -> bool {
        self.holders() > 0
    }
}

impl std::fmt::Debug for SleepInhibitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SleepInhibitor")
            .field("holders", &state.holders)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}
