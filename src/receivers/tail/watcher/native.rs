// SPDX-License-Identifier: Apache-2.0

//! Native file system watcher using the `notify` crate.
//!
//! Uses OS-level file system notifications:
//! - Linux: inotify
//! - macOS: FSEvents
//! - Windows: ReadDirectoryChangesW
//!
//! The parent directory is watched rather than the file itself, so creation
//! of a missing file and replacement of a rotated one are both observed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvError, Selector, TryRecvError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::traits::{FileWatcher, Wake, WatcherError};
use crate::receivers::tail::parent_dir;
use crate::receivers::tail::shutdown::ShutdownSignal;

type NotifyResult = Result<Event, notify::Error>;

/// Native file system watcher using OS-level notifications.
pub struct NativeWatcher {
    watcher: RecommendedWatcher,
    receiver: Receiver<NotifyResult>,
    shutdown: ShutdownSignal,
    /// Quiet period after the first event so bursts come back as one wake-up
    debounce: Duration,
    /// Directory registered with the backend
    watched_dir: Option<PathBuf>,
    file_name: Option<OsString>,
}

impl NativeWatcher {
    pub fn new(debounce: Duration, shutdown: ShutdownSignal) -> Result<Self, WatcherError> {
        let (tx, rx) = flume::unbounded();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            watcher,
            receiver: rx,
            shutdown,
            debounce,
            watched_dir: None,
            file_name: None,
        })
    }

    /// Whether a notification is about the followed file. Reads are ignored.
    fn is_relevant(&self, res: NotifyResult) -> bool {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("File watcher error: {}", e);
                return false;
            }
        };
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        let Some(ours) = self.file_name.as_deref() else {
            return false;
        };
        event.paths.iter().any(|p| p.file_name() == Some(ours))
    }

    /// Discard whatever queued up during the debounce window.
    fn drain(&mut self) -> Result<(), WatcherError> {
        loop {
            match self.receiver.try_recv() {
                Ok(res) => {
                    self.is_relevant(res);
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(WatcherError::Disconnected),
            }
        }
    }
}

impl FileWatcher for NativeWatcher {
    fn watch(&mut self, file: &Path) -> Result<(), WatcherError> {
        let name = file
            .file_name()
            .ok_or_else(|| WatcherError::Watch(format!("{:?} does not name a file", file)))?;

        let dir = parent_dir(file);
        if self.watched_dir.as_ref() != Some(&dir) {
            if let Some(old) = self.watched_dir.take() {
                let _ = self.watcher.unwatch(&old);
            }
            self.watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| WatcherError::Watch(e.to_string()))?;
            self.watched_dir = Some(dir);
        }

        self.file_name = Some(name.to_os_string());
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<Wake, WatcherError> {
        let deadline = Instant::now() + timeout;

        // Sibling files in the directory also notify; keep waiting past them.
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // `None` means shutdown.
            let next = Selector::new()
                .recv(&self.receiver, Some)
                .recv(self.shutdown.receiver(), |_| None)
                .wait_timeout(remaining);

            match next {
                Err(_) => return Ok(Wake::Timeout),
                Ok(None) => return Ok(Wake::Shutdown),
                Ok(Some(Err(RecvError::Disconnected))) => return Err(WatcherError::Disconnected),
                Ok(Some(Ok(res))) => {
                    if self.is_relevant(res) {
                        break;
                    }
                }
            }
        }

        if !self.debounce.is_zero() && self.shutdown.wait_timeout(self.debounce) {
            return Ok(Wake::Shutdown);
        }
        self.drain()?;
        Ok(Wake::Changed)
    }

    fn is_native(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}
