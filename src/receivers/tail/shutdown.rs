// SPDX-License-Identifier: Apache-2.0

//! Wake-up signal for the tail thread.
//!
//! The thread spends most of its life blocked in a watcher wait. Dropping or
//! firing the [`ShutdownTrigger`] disconnects the channel, which makes every
//! pending and future wait on a [`ShutdownSignal`] return immediately.

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

/// Owned by the stream handle. Fires on [`ShutdownTrigger::fire`] or drop.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: Option<Sender<()>>,
}

impl ShutdownTrigger {
    pub fn fire(&mut self) {
        self.tx.take();
    }
}

/// Cloned into the tail thread and its watcher.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        self.rx.is_disconnected()
    }

    /// Sleep for up to `timeout`. Returns true if shutdown fired first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    // Nothing is ever sent; disconnection is the signal.
    let (tx, rx) = flume::bounded(1);
    (ShutdownTrigger { tx: Some(tx) }, ShutdownSignal { rx })
}
