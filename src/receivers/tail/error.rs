// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

use super::watcher::WatcherError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The directory that should contain the followed file does not exist.
    #[error("Directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("Tail reader thread panicked")]
    ReaderPanicked,
}

pub type Result<T> = std::result::Result<T, Error>;
