//! Filesystem abstraction used by the walker and the size estimator.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;

/// Kind of a directory entry.
///
/// A symlink to a regular file counts as that file. Links to directories are
/// never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file, or a symlink resolving to one.
    File,
    /// Directory and dangling symlinks, sockets, devices and anything else.
    Other,
}

/// Entry returned by [`FileSystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path of the entry.
    pub path: PathBuf,
    /// What the entry is.
    pub kind: EntryKind,
    /// Length in bytes for files (of the link target for symlinks), 0 otherwise.
    pub len: u64,
}

/// Filesystem operations the transfer engine depends on.
pub trait FileSystem: Send + Sync {
    /// Whether `path` is an existing directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Create `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// * If a directory cannot be created
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// List the direct children of `path`, sorted by path.
    ///
    /// # Errors
    ///
    /// * If the directory cannot be read
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Copy `source` to `target` byte for byte, returning the bytes written.
    ///
    /// # Errors
    ///
    /// * If the source cannot be read or the target cannot be written
    fn copy_file(&self, source: &Path, target: &Path) -> io::Result<u64>;

    /// Sum the sizes of all files below `path`, following file symlinks.
    ///
    /// # Errors
    ///
    /// * If any part of the tree cannot be read
    /// * With [`io::ErrorKind::Interrupted`] if `cancel` is triggered
    fn tree_size(&self, path: &Path, cancel: &CancelToken) -> io::Result<u64>;
}

/// [`FileSystem`] backed by the local OS filesystem.
///
/// Network shares mounted as paths work the same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Create a new local filesystem handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        // A dangling symlink still occupies the name
        path.symlink_metadata().is_ok()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;

            let (kind, len) = if file_type.is_dir() {
                (EntryKind::Directory, 0)
            } else if file_type.is_file() {
                (EntryKind::File, entry.metadata()?.len())
            } else if let Some(len) = file_link_len(&entry.path()) {
                (EntryKind::File, len)
            } else {
                (EntryKind::Other, 0)
            };

            entries.push(DirEntry {
                path: entry.path(),
                kind,
                len,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn copy_file(&self, source: &Path, target: &Path) -> io::Result<u64> {
        let partial = partial_path(target);

        match fs::remove_file(&partial) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }

        let bytes = match copy_with_reflink(source, &partial) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };

        fs::rename(&partial, target)?;
        Ok(bytes)
    }

    fn tree_size(&self, path: &Path, cancel: &CancelToken) -> io::Result<u64> {
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ));
        }

        let mut total = 0;

        // Use jwalk with sort disabled for speed
        for entry in jwalk::WalkDir::new(path)
            .skip_hidden(false)
            .follow_links(false)
            .sort(false)
        {
            if cancel.is_cancelled() {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "size estimation cancelled",
                ));
            }

            let entry = entry.map_err(|e| io::Error::other(e.to_string()))?;
            let file_type = entry.file_type();
            if file_type.is_file() {
                let metadata = entry
                    .metadata()
                    .map_err(|e| io::Error::other(e.to_string()))?;
                total += metadata.len();
            } else if file_type.is_symlink() {
                total += file_link_len(&entry.path()).unwrap_or(0);
            }
        }

        Ok(total)
    }
}

/// Hidden sibling a file is written to before being renamed into place.
#[must_use]
pub fn partial_path(target: &Path) -> PathBuf {
    target.file_name().map_or_else(
        || target.with_extension("partial"),
        |name| target.with_file_name(format!(".{}.partial", name.to_string_lossy())),
    )
}

/// Length of the file a symlink points to.
///
/// `None` when `path` is not a symlink, or it dangles or resolves to
/// something other than a regular file.
fn file_link_len(path: &Path) -> Option<u64> {
    let link = fs::symlink_metadata(path).ok()?;
    if !link.file_type().is_symlink() {
        return None;
    }

    match fs::metadata(path) {
        Ok(target) if target.is_file() => Some(target.len()),
        Ok(_) => None,
        Err(e) => {
            log::debug!("Dangling symlink {}: {e}", path.display());
            None
        }
    }
}

/// Copy a single file, trying reflink first then falling back to regular copy.
fn copy_with_reflink(source: &Path, target: &Path) -> io::Result<u64> {
    // Try reflink first (copy-on-write, instant on APFS/Btrfs/ReFS)
    if reflink_copy::reflink(source, target).is_ok() {
        log::trace!("Reflinked {} -> {}", source.display(), target.display());
        return Ok(fs::metadata(target)?.len());
    }

    let bytes = fs::copy(source, target)?;
    log::trace!("Copied {} -> {}", source.display(), target.display());
    Ok(bytes)
}
