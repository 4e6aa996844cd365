// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-in for the broker with scriptable failures.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;

use super::client::{Connection, Connector};
use super::errors::{BrokerError, PublishError, PublishErrorKind};

#[derive(Default)]
struct State {
    available: bool,
    connect_attempts: usize,
    /// Bumped whenever the broker goes down; older connections are dead.
    generation: u64,
    failures: VecDeque<PublishErrorKind>,
    published: Vec<(String, Bytes)>,
}

/// Shared handle to the fake broker. Clones observe the same state.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
    published: Arc<Notify>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: true,
                ..Default::default()
            })),
            published: Arc::new(Notify::new()),
        }
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            broker: self.clone(),
        }
    }

    /// Taking the broker down also kills every open connection.
    pub fn set_available(&self, available: bool) {
        let mut state = self.state();
        if state.available && !available {
            state.generation += 1;
        }
        state.available = available;
    }

    /// Fail the next `n` publishes with `kind`.
    pub fn fail_next(&self, kind: PublishErrorKind, n: usize) {
        self.state().failures.extend(std::iter::repeat_n(kind, n));
    }

    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts
    }

    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.state().published.clone()
    }

    pub fn published_payloads(&self) -> Vec<Bytes> {
        self.state()
            .published
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Wait until at least `n` messages were published. Returns false on
    /// timeout.
    pub async fn wait_for_published(&self, n: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.published.notified();
                if self.state().published.len() >= n {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct MemoryConnector {
    broker: MemoryBroker,
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn address(&self) -> &str {
        "memory://"
    }

    async fn connect(&self) -> Result<MemoryConnection, BrokerError> {
        let mut state = self.broker.state();
        state.connect_attempts += 1;
        if !state.available {
            return Err(BrokerError::Connect("connection refused".to_string()));
        }
        Ok(MemoryConnection {
            broker: self.broker.clone(),
            generation: state.generation,
        })
    }
}

pub struct MemoryConnection {
    broker: MemoryBroker,
    generation: u64,
}

impl Connection for MemoryConnection {
    async fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<(), PublishError> {
        {
            let mut state = self.broker.state();
            if !state.available || state.generation != self.generation {
                return Err(PublishError::connection_lost("connection reset by peer"));
            }
            match state.failures.pop_front() {
                Some(PublishErrorKind::ConnectionLost) => {
                    return Err(PublishError::connection_lost("broken pipe"));
                }
                Some(PublishErrorKind::BrokerRejected) => {
                    return Err(PublishError::rejected("ERR scripted rejection"));
                }
                None => {}
            }
            state
                .published
                .push((channel.to_string(), Bytes::copy_from_slice(payload)));
        }
        self.broker.published.notify_waiters();
        Ok(())
    }
}
