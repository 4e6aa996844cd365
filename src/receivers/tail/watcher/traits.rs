// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("watcher initialization failed: {0}")]
    Init(String),

    #[error("watch failed: {0}")]
    Watch(String),

    /// The backend stopped delivering notifications.
    #[error("watcher backend disconnected")]
    Disconnected,
}

/// Why [`FileWatcher::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The followed path was created, written, replaced or removed.
    Changed,
    /// Nothing seen within the timeout. The caller checks the file anyway.
    Timeout,
    /// The tail stream is shutting down.
    Shutdown,
}

/// Change notification for the one path a tail stream follows.
///
/// The path does not need to exist when it is watched. Waits are cut short
/// by the stream's shutdown signal.
pub trait FileWatcher {
    fn watch(&mut self, file: &Path) -> Result<(), WatcherError>;

    /// Block until the followed file may have changed, `timeout` passes, or
    /// shutdown fires.
    fn wait(&mut self, timeout: Duration) -> Result<Wake, WatcherError>;

    /// True for inotify/kqueue/FSEvents, false for polling.
    fn is_native(&self) -> bool;

    fn backend_name(&self) -> &'static str;
}
