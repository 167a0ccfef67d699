//! Error types for copy operations.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

/// Errors that abort a tree copy.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Failed to list a source directory.
    #[error("Failed to read directory {}: {io_error}", path.display())]
    ReadDirError {
        /// The directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        io_error: std::io::Error,
    },

    /// Failed to create a target directory.
    #[error("Failed to create directory {}: {io_error}", path.display())]
    CreateDirError {
        /// The directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        io_error: std::io::Error,
    },

    /// Failed to copy a file.
    #[error("Failed to copy {} to {}: {io_error}", source_path.display(), target_path.display())]
    FileCopyError {
        /// Source file path.
        source_path: PathBuf,
        /// Target file path.
        target_path: PathBuf,
        /// The underlying IO error.
        #[source]
        io_error: std::io::Error,
    },
}

impl CopyError {
    /// The path the failure is attributed to.
    ///
    /// For file copies this is the source file, since an unreadable remote
    /// file is the common case.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::ReadDirError { path, .. } | Self::CreateDirError { path, .. } => path,
            Self::FileCopyError { source_path, .. } => source_path,
        }
    }

    /// The underlying IO error.
    #[must_use]
    pub const fn io_error(&self) -> &std::io::Error {
        match self {
            Self::ReadDirError { io_error, .. }
            | Self::CreateDirError { io_error, .. }
            | Self::FileCopyError { io_error, .. } => io_error,
        }
    }
}
