// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::Deserialize;

use crate::exporters::redis::BrokerConfig;
use crate::exporters::retry::RetryConfig;
use crate::receivers::tail::{StartAt, TailConfig, WatchMode};
use crate::topology::payload::ChannelName;
use crate::viewer::DEFAULT_LIMIT;

/// Where to start reading the file present at startup
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartAtArg {
    /// Publish the existing content first
    #[default]
    Beginning,
    /// Only publish lines appended after startup
    End,
}

impl From<StartAtArg> for StartAt {
    fn from(s: StartAtArg) -> Self {
        match s {
            StartAtArg::Beginning => StartAt::Beginning,
            StartAtArg::End => StartAt::End,
        }
    }
}

/// Watch mode for file system monitoring
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatchModeArg {
    /// Native notifications first, polling fallback
    #[default]
    Auto,
    /// Force native file system watching (inotify/kqueue/FSEvents)
    Native,
    /// Force polling (use for NFS or container volumes)
    Poll,
}

impl From<WatchModeArg> for WatchMode {
    fn from(w: WatchModeArg) -> Self {
        match w {
            WatchModeArg::Auto => WatchMode::Auto,
            WatchModeArg::Native => WatchMode::Native,
            WatchModeArg::Poll => WatchMode::Poll,
        }
    }
}

#[derive(Debug, Args, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeArgs {
    /// Redis broker URL
    #[arg(
        long,
        env = "TAILBRIDGE_BROKER_ADDRESS",
        default_value = "redis://redis:6379"
    )]
    pub broker_address: String,

    /// Pub/sub channel every line is published to
    #[arg(long, env = "TAILBRIDGE_CHANNEL", default_value = "file_events")]
    pub channel: String,

    /// File to follow
    #[arg(
        long,
        env = "TAILBRIDGE_FILE_PATH",
        default_value = "/app/dat/changes_log.json"
    )]
    pub file_path: PathBuf,

    /// Poll interval in milliseconds for checking file changes (used in poll mode or as fallback)
    #[arg(long, env = "TAILBRIDGE_POLL_INTERVAL_MS", default_value = "250")]
    pub poll_interval_ms: u64,

    /// Reopen the path when the file is rotated or recreated
    #[arg(
        long,
        env = "TAILBRIDGE_REOPEN",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    pub reopen: bool,

    /// Where to start reading: beginning or end of file
    #[arg(
        value_enum,
        long,
        env = "TAILBRIDGE_START_AT",
        default_value = "beginning"
    )]
    pub start_at: StartAtArg,

    /// Watch mode: auto (default), native (inotify/kqueue/FSEvents), poll (for NFS)
    #[arg(
        value_enum,
        long,
        env = "TAILBRIDGE_WATCH_MODE",
        default_value = "auto"
    )]
    pub watch_mode: WatchModeArg,

    /// Debounce interval in milliseconds for the native file watcher
    #[arg(long, env = "TAILBRIDGE_DEBOUNCE_INTERVAL_MS", default_value = "100")]
    pub debounce_interval_ms: u64,

    /// Maximum line size in bytes, longer lines are dropped
    #[arg(long, env = "TAILBRIDGE_MAX_LINE_SIZE", default_value = "1048576")]
    pub max_line_size: usize,

    /// Number of lines buffered between the file reader and the publisher
    #[arg(long, env = "TAILBRIDGE_LINE_QUEUE_SIZE", default_value = "1024")]
    pub line_queue_size: usize,

    /// Delay before the first broker reconnect attempt
    #[arg(long, env = "TAILBRIDGE_BROKER_RETRY_INITIAL_BACKOFF", default_value = "2s",
        value_parser = humantime::parse_duration)]
    pub broker_retry_initial_backoff: Duration,

    /// Upper bound for the broker reconnect delay
    #[arg(long, env = "TAILBRIDGE_BROKER_RETRY_MAX_BACKOFF", default_value = "2s",
        value_parser = humantime::parse_duration)]
    pub broker_retry_max_backoff: Duration,

    /// Timeout for establishing a broker connection
    #[arg(long, env = "TAILBRIDGE_BROKER_CONNECT_TIMEOUT", default_value = "5s",
        value_parser = humantime::parse_duration)]
    pub broker_connect_timeout: Duration,

    /// Timeout for a single publish
    #[arg(long, env = "TAILBRIDGE_BROKER_RESPONSE_TIMEOUT", default_value = "5s",
        value_parser = humantime::parse_duration)]
    pub broker_response_timeout: Duration,
}

impl Default for BridgeArgs {
    fn default() -> Self {
        Self {
            broker_address: "redis://redis:6379".to_string(),
            channel: "file_events".to_string(),
            file_path: PathBuf::from("/app/dat/changes_log.json"),
            poll_interval_ms: 250,
            reopen: true,
            start_at: StartAtArg::Beginning,
            watch_mode: WatchModeArg::Auto,
            debounce_interval_ms: 100,
            max_line_size: 1024 * 1024,
            line_queue_size: 1024,
            broker_retry_initial_backoff: Duration::from_secs(2),
            broker_retry_max_backoff: Duration::from_secs(2),
            broker_connect_timeout: Duration::from_secs(5),
            broker_response_timeout: Duration::from_secs(5),
        }
    }
}

impl BridgeArgs {
    pub fn tail_config(&self) -> TailConfig {
        TailConfig {
            follow: true,
            reopen: self.reopen,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            watch_mode: self.watch_mode.into(),
            debounce_interval: Duration::from_millis(self.debounce_interval_ms),
            start_at: self.start_at.into(),
            max_line_size: self.max_line_size,
            line_queue_size: self.line_queue_size,
        }
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            address: self.broker_address.clone(),
            retry: RetryConfig {
                initial_backoff: self.broker_retry_initial_backoff,
                max_backoff: self.broker_retry_max_backoff,
            },
            connect_timeout: self.broker_connect_timeout,
            response_timeout: self.broker_response_timeout,
        }
    }

    pub fn channel(&self) -> Result<ChannelName, String> {
        if self.channel.is_empty() {
            return Err("channel must not be empty".to_string());
        }
        Ok(ChannelName::new(self.channel.as_str()))
    }
}

#[derive(Debug, Args, Clone)]
pub struct ViewArgs {
    /// Change log to display
    #[arg(
        long,
        env = "TAILBRIDGE_FILE_PATH",
        default_value = "/app/dat/changes_log.json"
    )]
    pub file_path: PathBuf,

    /// Maximum number of entries shown
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,

    /// Read keys from stdin (k/j/enter/r/q, one per line) and redraw
    #[arg(long, default_value = "false")]
    pub interactive: bool,
}
