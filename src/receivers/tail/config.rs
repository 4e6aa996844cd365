// SPDX-License-Identifier: Apache-2.0

//! Configuration for the tail reader.

use std::time::Duration;

use super::watcher::{WatchMode, WatcherConfig};

/// Where to start reading the file that exists when the stream is opened.
///
/// Files that show up later (after a rotation, or a file that did not exist
/// at open time) are always read from the beginning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartAt {
    /// Publish the existing history, then follow.
    #[default]
    Beginning,
    /// Skip existing content, only follow new lines.
    End,
}

#[derive(Debug, Clone)]
pub struct TailConfig {
    /// Keep waiting for new lines after reaching end of file
    pub follow: bool,
    /// Reattach to a new file created at the same path after rotation
    pub reopen: bool,
    /// How often to check the file when no notification arrives
    pub poll_interval: Duration,
    pub watch_mode: WatchMode,
    /// Debounce interval for native watcher events
    pub debounce_interval: Duration,
    pub start_at: StartAt,
    /// Lines longer than this many bytes are dropped
    pub max_line_size: usize,
    /// Capacity of the hand-off queue between the reader thread and consumer
    pub line_queue_size: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            follow: true,
            reopen: true,
            poll_interval: Duration::from_millis(250),
            watch_mode: WatchMode::Auto,
            debounce_interval: Duration::from_millis(100),
            start_at: StartAt::Beginning,
            max_line_size: 1024 * 1024,
            line_queue_size: 1024,
        }
    }
}

impl TailConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll interval must be positive".to_string());
        }

        if self.max_line_size == 0 {
            return Err("max_line_size must be positive".to_string());
        }

        if self.line_queue_size == 0 {
            return Err("line_queue_size must be positive".to_string());
        }

        Ok(())
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            mode: self.watch_mode,
            poll_interval: self.poll_interval,
            debounce_interval: self.debounce_interval,
        }
    }
}
