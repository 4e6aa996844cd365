// SPDX-License-Identifier: Apache-2.0

//! The forwarding loop: every line from the tail reader becomes one publish.
//!
//! Lines are forwarded one at a time, in order. A failed publish is never
//! retried. A lost connection costs the line that discovered it, after which
//! the loop reconnects before reading the next line. A rejected publish costs
//! only that line.

use futures::{Stream, StreamExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exporters::redis::{Cancelled, ConnectionManager, Connector, PublishErrorKind};
use crate::topology::payload::{ChannelName, LogLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the first connection
    Connecting,
    Connected,
    /// Connection lost, waiting for a new one
    Reconnecting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub published: u64,
    pub dropped_connection_lost: u64,
    pub dropped_rejected: u64,
    pub reconnects: u64,
}

impl ForwardStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_connection_lost + self.dropped_rejected
    }
}

pub struct Forwarder<C: Connector> {
    manager: ConnectionManager<C>,
    channel: ChannelName,
    state: LoopState,
    stats: ForwardStats,
}

impl<C: Connector> Forwarder<C> {
    pub fn new(manager: ConnectionManager<C>, channel: ChannelName) -> Self {
        let state = if manager.is_connected() {
            LoopState::Connected
        } else {
            LoopState::Connecting
        };
        Self {
            manager,
            channel,
            state,
            stats: ForwardStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats
    }

    /// Block until the broker is reachable. Lines are not read before this
    /// succeeds.
    pub async fn connect(&mut self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        self.manager.connect(cancel).await?;
        self.state = LoopState::Connected;
        Ok(())
    }

    /// Forward lines until `cancel` fires or `lines` ends.
    pub async fn run<S>(&mut self, lines: &mut S, cancel: &CancellationToken) -> ForwardStats
    where
        S: Stream<Item = LogLine> + Unpin,
    {
        if self.state != LoopState::Connected && self.connect(cancel).await.is_err() {
            debug!("Forwarder received shutdown signal before connecting");
            return self.stop();
        }

        loop {
            let line = select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Forwarder received shutdown signal, exiting main loop");
                    break;
                }
                line = lines.next() => line,
            };

            let Some(line) = line else {
                info!("Line source has ended, stopping forwarder");
                break;
            };

            if self.forward(line, cancel).await.is_err() {
                debug!("Forwarder received shutdown signal while reconnecting");
                break;
            }
        }

        self.stop()
    }

    async fn forward(&mut self, line: LogLine, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let result = select! {
            biased;

            _ = cancel.cancelled() => return Err(Cancelled),
            result = self.manager.publish(&self.channel, &line) => result,
        };

        let err = match result {
            Ok(()) => {
                self.stats.published += 1;
                return Ok(());
            }
            Err(e) => e,
        };

        match err.kind {
            PublishErrorKind::BrokerRejected => {
                self.stats.dropped_rejected += 1;
                warn!(
                    channel = %self.channel,
                    len = line.len(),
                    reason = %err.reason,
                    "Broker rejected line, dropping it."
                );
                Ok(())
            }
            PublishErrorKind::ConnectionLost => {
                self.stats.dropped_connection_lost += 1;
                warn!(
                    channel = %self.channel,
                    len = line.len(),
                    reason = %err.reason,
                    "Broker connection lost, dropping line and reconnecting."
                );

                self.state = LoopState::Reconnecting;
                self.manager.connect(cancel).await?;
                self.state = LoopState::Connected;
                self.stats.reconnects += 1;
                Ok(())
            }
        }
    }

    fn stop(&self) -> ForwardStats {
        info!(
            published = self.stats.published,
            dropped_connection_lost = self.stats.dropped_connection_lost,
            dropped_rejected = self.stats.dropped_rejected,
            reconnects = self.stats.reconnects,
            "Forwarder stopped"
        );
        self.stats
    }
}
