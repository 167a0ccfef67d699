//! OS-level sleep backends.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};

use crate::error::PowerError;

/// Switches the OS between "sleep allowed" and "sleep disallowed".
///
/// Implementations must tolerate repeated calls of either operation.
pub trait SleepBackend: Send + Sync {
    /// Stop the system from idling into sleep.
    ///
    /// # Errors
    ///
    /// * If the OS setting cannot be changed
    fn prevent_sleep(&self) -> Result<(), PowerError>;

    /// Let the system sleep again.
    ///
    /// # Errors
    ///
    /// * If the OS setting cannot be restored
    fn allow_sleep(&self) -> Result<(), PowerError>;
}

/// Backend that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl SleepBackend for NoopBackend {
    fn prevent_sleep(&self) -> Result<(), PowerError> {
        log::debug!("Sleep prevention disabled; not preventing sleep");
        Ok(())
    }

    fn allow_sleep(&self) -> Result<(), PowerError> {
        Ok(())
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to run.
    pub program: String,
    /// Arguments passed to it.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build a command from a program and arguments.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }

    fn run(&self) -> Result<(), PowerError> {
        log::debug!("Running {} {}", self.program, self.args.join(" "));

        let status = self.command().status().map_err(|e| PowerError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(PowerError::CommandFailed {
                program: self.program.clone(),
                status,
            })
        }
    }
}

/// Backend that runs one command to prevent sleep and another to allow it.
///
/// Used on Windows with `powercfg`, which changes the standby timeout.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    prevent: CommandSpec,
    allow: CommandSpec,
}

impl CommandBackend {
    /// Create a backend from a prevent/allow command pair.
    #[must_use]
    pub const fn new(prevent: CommandSpec, allow: CommandSpec) -> Self {
        Self { prevent, allow }
    }

    /// `powercfg` backend: sets the AC standby timeout to 0 while preventing and
    /// restores it to `standby_timeout_minutes` afterwards.
    #[must_use]
    pub fn powercfg(standby_timeout_minutes: u32) -> Self {
        Self::new(
            CommandSpec::new("powercfg", ["/change", "standby-timeout-ac", "0"]),
            CommandSpec::new(
                "powercfg",
                [
                    "/change".to_string(),
                    "standby-timeout-ac".to_string(),
                    standby_timeout_minutes.to_string(),
                ],
            ),
        )
    }
}

impl SleepBackend for CommandBackend {
    fn prevent_sleep(&self) -> Result<(), PowerError> {
        self.prevent.run()
    }

    fn allow_sleep(&self) -> Result<(), PowerError> {
        self.allow.run()
    }
}

/// Backend that keeps a blocking helper process alive while sleep is prevented.
///
/// `systemd-inhibit` and `caffeinate` hold their inhibition for as long as the
/// wrapped process runs, so allowing sleep is just killing it.
#[derive(Debug)]
pub struct InhibitorBackend {
    command: CommandSpec,
    child: Mutex<Option<Child>>,
}

impl InhibitorBackend {
    /// Create a backend that spawns `command` to hold the inhibition.
    #[must_use]
    pub const fn new(command: CommandSpec) -> Self {
        Self {
            command,
            child: Mutex::new(None),
        }
    }

    /// `systemd-inhibit` holding idle and sleep locks.
    #[must_use]
    pub fn systemd_inhibit() -> Self {
        Self::new(CommandSpec::new(
            "systemd-inhibit",
            [
                "--what=idle:sleep",
                "--who=game-transfer",
                "--why=Transferring games",
                "--mode=block",
                "sleep",
                "infinity",
            ],
        ))
    }

    /// `caffeinate` preventing idle sleep.
    #[must_use]
    pub fn caffeinate() -> Self {
        Self::new(CommandSpec::new("caffeinate", ["-i"]))
    }

    fn stop(&self, child: &mut Child) -> Result<(), PowerError> {
        match child.kill() {
            // InvalidInput means the process already exited
            Err(e) if e.kind() != io::ErrorKind::InvalidInput => {
                return Err(PowerError::Stop {
                    program: self.command.program.clone(),
                    source: e,
                });
            }
            _ => {}
        }

        child.wait().map_err(|e| PowerError::Stop {
            program: self.command.program.clone(),
            source: e,
        })?;
        Ok(())
    }
}

impl SleepBackend for InhibitorBackend {
    fn prevent_sleep(&self) -> Result<(), PowerError> {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if child.is_some() {
            return Ok(());
        }

        log::debug!(
            "Spawning {} {}",
            self.command.program,
            self.command.args.join(" ")
        );

        let spawned = self
            .command
            .command()
            .spawn()
            .map_err(|e| PowerError::Spawn {
                program: self.command.program.clone(),
                source: e,
            })?;
        *child = Some(spawned);
        Ok(())
    }

    fn allow_sleep(&self) -> Result<(), PowerError> {
        let taken = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match taken {
            Some(mut child) => self.stop(&mut child),
            None => Ok(()),
        }
    }
}

impl Drop for InhibitorBackend {
    fn drop(&mut self) {
        if let Err(e) = self.allow_sleep() {
            log::warn!("Could not allow sleep: {e}");
        }
    }
}

/// Pick the backend for the current platform.
///
/// `standby_timeout_minutes` is the value restored on Windows once transfers
/// finish; other platforms ignore it.
#[must_use]
pub fn default_backend(standby_timeout_minutes: u32) -> Box<dyn SleepBackend> {
    #[cfg(windows)]
    {
        Box::new(CommandBackend::powercfg(standby_timeout_minutes))
    }

    #[cfg(target_os = "linux")]
    {
        let _ = standby_timeout_minutes;
        Box::new(InhibitorBackend::systemd_inhibit())
    }

    #[cfg(target_os = "macos")]
    {
        let _ = standby_timeout_minutes;
        Box::new(InhibitorBackend::caffeinate())
    }

    #[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
    {
        let _ = standby_timeout_minutes;
        Box::new(NoopBackend)
    }
}
