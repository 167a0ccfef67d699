//! Resumable tree copy.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::Path;

use crate::cancel::CancelToken;
use crate::error::CopyError;
use crate::fs::{EntryKind, FileSystem};
use crate::progress::ProgressTracker;

/// Counters for a single walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Files copied to the target.
    pub files_copied: u64,
    /// Files skipped because something already existed at the target.
    pub files_skipped: u64,
    /// Directories created at the target.
    pub dirs_created: u64,
}

/// Result of a tree copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyResult {
    /// Every entry was visited.
    Completed(CopyStats),
    /// Cancellation was observed; the target holds a partial tree.
    Cancelled(CopyStats),
}

impl CopyResult {
    /// Counters for the walk, however it ended.
    #[must_use]
    pub const fn stats(&self) -> CopyStats {
        match self {
            Self::Completed(stats) | Self::Cancelled(stats) => *stats,
        }
    }
}

/// Outcome of visiting one directory.
enum Visit {
    Continue,
    Stop,
}

/// Mirror the tree below `source` into `target`.
///
/// Directories are created before anything beneath them. A file is copied
/// only if nothing exists at its target path yet, so re-running against a
/// partial target copies just the missing files. The source length of every
/// visited file, copied or skipped, is added to `tracker`. A skipped file
/// therefore counts its source length even when the file already at the target
/// differs in size, so the bytes reported can differ from the bytes actually
/// present at the target.
///
/// Symlinks to files are copied as the file they point to. Links to
/// directories, dangling links and special files are skipped.
///
/// `cancel` is checked before each directory and each file. Once it is set
/// the walk stops and the target is left as it is.
///
/// # Arguments
///
/// * `fs` - Filesystem to operate on
/// * `source` - Source directory path
/// * `target` - Target directory path (created if missing)
/// * `tracker` - Receives the bytes handled
/// * `cancel` - Cooperative cancellation flag
///
/// # Errors
///
/// * If a source directory cannot be listed
/// * If a target directory cannot be created
/// * If a file copy fails (fail-fast behavior)
pub fn copy_tree(
    fs: &dyn FileSystem,
    source: &Path,
    target: &Path,
    tracker: &ProgressTracker,
    cancel: &CancelToken,
) -> Result<CopyResult, CopyError> {
    log::debug!(
        "Copying tree: {} -> {}",
        source.display(),
        target.display()
    );

    let mut stats = CopyStats::default();

    let visit = visit_dir(fs, source, target, tracker, cancel, &mut stats)?;

    log::debug!(
        "Walk of {} finished: {} copied, {} skipped, {} directories created",
        source.display(),
        stats.files_copied,
        stats.files_skipped,
        stats.dirs_created
    );

    Ok(match visit {
        Visit::Continue => CopyResult::Completed(stats),
        Visit::Stop => CopyResult::Cancelled(stats),
    })
}

fn visit_dir(
    fs: &dyn FileSystem,
    source: &Path,
    target: &Path,
    tracker: &ProgressTracker,
    cancel: &CancelToken,
    stats: &mut CopyStats,
) -> Result<Visit, CopyError> {
    if cancel.is_cancelled() {
        log::debug!("Cancelled before {}", source.display());
        return Ok(Visit::Stop);
    }

    if !fs.is_dir(target) {
        log::debug!("Creating folder {}", target.display());
        fs.create_dir_all(target)
            .map_err(|e| CopyError::CreateDirError {
                path: target.to_path_buf(),
                io_error: e,
            })?;
        stats.dirs_created += 1;
    }

    let entries = fs.read_dir(source).map_err(|e| CopyError::ReadDirError {
        path: source.to_path_buf(),
        io_error: e,
    })?;

    for entry in entries {
        let Some(name) = entry.path.file_name() else {
            continue;
        };
        let target_path = target.join(name);

        match entry.kind {
            EntryKind::Directory => {
                if let Visit::Stop = visit_dir(fs, &entry.path, &target_path, tracker, cancel, stats)? {
                    return Ok(Visit::Stop);
                }
            }
            EntryKind::File => {
                if cancel.is_cancelled() {
                    log::debug!("Cancelled before {}", entry.path.display());
                    return Ok(Visit::Stop);
                }

                if fs.exists(&target_path) {
                    log::debug!("Already exists {}", target_path.display());
                    stats.files_skipped += 1;
                } else {
                    log::debug!("Copying {}", entry.path.display());
                    fs.copy_file(&entry.path, &target_path)
                        .map_err(|e| CopyError::FileCopyError {
                            source_path: entry.path.clone(),
                            target_path: target_path.clone(),
                            io_error: e,
                        })?;
                    stats.files_copied += 1;
                }

                tracker.add_transferred(entry.len);
            }
            EntryKind::Other => {
                log::debug!("Skipping non-regular file {}", entry.path.display());
            }
        }
    }

    Ok(Visit::Continue)
}
