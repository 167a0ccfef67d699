//! Best-effort tree size estimation.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::io;
use std::path::Path;

use crate::cancel::CancelToken;
use crate::fs::FileSystem;

/// Estimate the total size of the regular files below `source`.
///
/// Returns `None` if the scan fails or is cancelled. A missing estimate is a
/// normal outcome, so failures are logged rather than returned.
#[must_use]
pub fn estimate_tree_size(fs: &dyn FileSystem, source: &Path, cancel: &CancelToken) -> Option<u64> {
    log::debug!("Calculating size of {}", source.display());

    match fs.tree_size(source, cancel) {
        Ok(total) => {
            log::debug!("Size of {} is {total} bytes", source.display());
            Some(total)
        }
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
            log::debug!("Size estimation for {} cancelled", source.display());
            None
        }
        Err(e) => {
            log::warn!("Could not calculate size of {}: {e}", source.display());
            None
        }
    }
}
