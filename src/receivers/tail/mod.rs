// SPDX-License-Identifier: Apache-2.0

//! Follows a single append-only file and yields each complete line once.
//!
//! The file is followed across rotation (rename or remove and recreate),
//! truncation, and not existing yet. Change notifications come from the
//! native file system watcher where available, with a polling fallback.

pub mod config;
pub mod error;
pub mod file_id;
pub mod follower;
pub mod reader;
pub mod shutdown;
pub mod stream;
pub mod watcher;

pub use config::{StartAt, TailConfig};
pub use error::{Error, Result};
pub use file_id::FileId;
pub use stream::TailStream;
pub use watcher::WatchMode;

use std::path::{Path, PathBuf};

/// Directory that holds `file`; a bare file name lives in the working
/// directory.
pub(crate) fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
