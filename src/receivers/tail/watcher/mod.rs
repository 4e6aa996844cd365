// SPDX-License-Identifier: Apache-2.0

//! Change notification for the followed file.
//!
//! Two backends: OS notifications through `notify`, and a stat poller for
//! NFS and container volumes where notifications are unreliable. `auto`
//! prefers notifications and drops to polling when they cannot be set up.
//! Whatever the backend, the tail thread also checks the file every poll
//! interval, so a missed notification only costs latency.

mod native;
mod poll;
mod traits;

pub use native::NativeWatcher;
pub use poll::PollWatcher;
pub use traits::{FileWatcher, Wake, WatcherError};

use std::time::Duration;

use tracing::warn;

use super::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// Native notifications, polling if they are unavailable
    #[default]
    Auto,
    /// Native notifications only; fails where they are unsupported
    Native,
    /// Stat polling only
    Poll,
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub mode: WatchMode,
    pub poll_interval: Duration,
    /// Quiet period after a native event before the reader is woken
    pub debounce_interval: Duration,
}

pub type AnyWatcher = Box<dyn FileWatcher + Send>;

/// Build the watcher for `config.mode`. In `Auto` mode a native backend that
/// fails to initialize is replaced by polling.
pub fn create_watcher(
    config: &WatcherConfig,
    shutdown: ShutdownSignal,
) -> Result<AnyWatcher, WatcherError> {
    match config.mode {
        WatchMode::Native => Ok(Box::new(NativeWatcher::new(
            config.debounce_interval,
            shutdown,
        )?)),
        WatchMode::Poll => Ok(fallback_watcher(config, shutdown)),
        WatchMode::Auto => match NativeWatcher::new(config.debounce_interval, shutdown.clone()) {
            Ok(watcher) => Ok(Box::new(watcher)),
            Err(e) => {
                warn!(
                    "Native file watching unavailable ({}), falling back to polling",
                    e
                );
                Ok(fallback_watcher(config, shutdown))
            }
        },
    }
}

/// Polling watcher used in place of a native one that failed.
pub fn fallback_watcher(config: &WatcherConfig, shutdown: ShutdownSignal) -> AnyWatcher {
    Box::new(PollWatcher::new(config.poll_interval, shutdown))
}
