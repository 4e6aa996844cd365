// SPDX-License-Identifier: Apache-2.0

//! Polling-based file watcher for systems where native file system
//! notifications are unavailable or unreliable (NFS, some container volume
//! mounts).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use super::traits::{FileWatcher, Wake, WatcherError};
use crate::receivers::tail::file_id::FileId;
use crate::receivers::tail::shutdown::ShutdownSignal;

/// What a stat of the followed path looked like
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileState {
    id: Option<FileId>,
    modified: Option<SystemTime>,
    size: u64,
}

impl FileState {
    fn read(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(Self {
            id: FileId::from_path(path).ok(),
            modified: metadata.modified().ok(),
            size: metadata.len(),
        })
    }
}

/// Stats the followed path once per poll interval. Any difference in
/// identity, size or mtime, or the file appearing or vanishing, is a change.
pub struct PollWatcher {
    path: Option<PathBuf>,
    /// `None` while the file is absent
    last: Option<FileState>,
    poll_interval: Duration,
    last_poll: Instant,
    shutdown: ShutdownSignal,
}

impl PollWatcher {
    pub fn new(poll_interval: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            path: None,
            last: None,
            poll_interval,
            last_poll: Instant::now(),
            shutdown,
        }
    }

    /// Stat the path if a poll is due. Returns true if it changed.
    fn poll_if_needed(&mut self) -> bool {
        if self.last_poll.elapsed() < self.poll_interval {
            return false;
        }
        self.last_poll = Instant::now();

        let Some(path) = self.path.as_deref() else {
            return false;
        };
        let current = FileState::read(path);
        let changed = current != self.last;
        self.last = current;
        changed
    }
}

impl FileWatcher for PollWatcher {
    fn watch(&mut self, file: &Path) -> Result<(), WatcherError> {
        self.last = FileState::read(file);
        self.path = Some(file.to_path_buf());
        self.last_poll = Instant::now();
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<Wake, WatcherError> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.poll_if_needed() {
                return Ok(Wake::Changed);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Wake::Timeout);
            }

            let until_poll = self.poll_interval.saturating_sub(self.last_poll.elapsed());
            let sleep = until_poll.min(deadline - now);
            if self.shutdown.wait_timeout(sleep) {
                return Ok(Wake::Shutdown);
            }
        }
    }

    fn is_native(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::tail::shutdown;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(20);

    fn watcher_for(path: &Path) -> (shutdown::ShutdownTrigger, PollWatcher) {
        let (trigger, signal) = shutdown::channel();
        let mut watcher = PollWatcher::new(POLL, signal);
        watcher.watch(path).unwrap();
        (trigger, watcher)
    }

    #[test]
    fn test_poll_watcher_detects_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("changes.log");
        let (_trigger, mut watcher) = watcher_for(&file_path);

        File::create(&file_path).unwrap();

        assert_eq!(watcher.wait(Duration::from_millis(500)).unwrap(), Wake::Changed);
    }

    #[test]
    fn test_poll_watcher_detects_append() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("changes.log");
        File::create(&file_path).unwrap();
        let (_trigger, mut watcher) = watcher_for(&file_path);

        let mut file = fs::OpenOptions::new().append(true).open(&file_path).unwrap();
        file.write_all(b"more content\n").unwrap();

        assert_eq!(watcher.wait(Duration::from_millis(500)).unwrap(), Wake::Changed);
    }

    #[test]
    fn test_poll_watcher_detects_same_size_replacement() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("changes.log");
        fs::write(&file_path, b"old\n").unwrap();
        let (_trigger, mut watcher) = watcher_for(&file_path);

        let staged = temp_dir.path().join("changes.log.new");
        fs::write(&staged, b"new\n").unwrap();
        fs::rename(&staged, &file_path).unwrap();

        assert_eq!(watcher.wait(Duration::from_millis(500)).unwrap(), Wake::Changed);
    }

    #[test]
    fn test_poll_watcher_detects_file_remove() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("changes.log");
        File::create(&file_path).unwrap();
        let (_trigger, mut watcher) = watcher_for(&file_path);

        fs::remove_file(&file_path).unwrap();

        assert_eq!(watcher.wait(Duration::from_millis(500)).unwrap(), Wake::Changed);
    }

    #[test]
    fn test_poll_watcher_times_out_when_idle() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("changes.log");
        File::create(&file_path).unwrap();
        let (_trigger, mut watcher) = watcher_for(&file_path);

        let start = Instant::now();
        assert_eq!(watcher.wait(POLL * 3).unwrap(), Wake::Timeout);
        assert!(start.elapsed() >= POLL * 3);
    }

    #[test]
    fn test_poll_watcher_wait_interrupted_by_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let (mut trigger, mut watcher) = watcher_for(&temp_dir.path().join("changes.log"));
        trigger.fire();

        let start = Instant::now();
        assert_eq!(watcher.wait(Duration::from_secs(5)).unwrap(), Wake::Shutdown);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_poll_watcher_backend() {
        let (_trigger, signal) = shutdown::channel();
        let watcher = PollWatcher::new(Duration::from_millis(100), signal);
        assert!(!watcher.is_native());
        assert_eq!(watcher.backend_name(), "poll");
    }
}
