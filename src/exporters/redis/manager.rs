// SPDX-License-Identifier: Apache-2.0

//! Owns the single broker connection on behalf of the forwarding loop.

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::client::{Connection, Connector};
use super::errors::{Cancelled, PublishError};
use crate::exporters::retry::{Backoff, RetryConfig};
use crate::topology::payload::{ChannelName, LogLine};

pub struct ConnectionManager<C: Connector> {
    connector: C,
    retry: RetryConfig,
    handle: Option<C::Connection>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, retry: RetryConfig) -> Self {
        Self {
            connector,
            retry,
            handle: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn address(&self) -> &str {
        self.connector.address()
    }

    /// Keep trying until a connection passes its health check.
    ///
    /// Never gives up on its own; only `cancel` ends the loop early.
    pub async fn connect(&mut self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        self.handle = None;
        let mut backoff = Backoff::new(self.retry.clone());

        loop {
            let result = select! {
                biased;

                _ = cancel.cancelled() => return Err(Cancelled),
                result = self.connector.connect() => result,
            };

            let error = match result {
                Ok(conn) => {
                    info!(
                        address = self.connector.address(),
                        attempts = backoff.attempts() + 1,
                        "Connected to broker"
                    );
                    self.handle = Some(conn);
                    return Ok(());
                }
                Err(e) => e,
            };

            let delay = backoff.next_delay();
            warn!(
                address = self.connector.address(),
                attempt = backoff.attempts(),
                delay = ?delay,
                error = %error,
                "Broker unavailable, will retry again after delay."
            );

            select! {
                biased;

                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Publish one line. A lost connection is discarded so the next
    /// `connect` starts from scratch.
    pub async fn publish(
        &mut self,
        channel: &ChannelName,
        line: &LogLine,
    ) -> Result<(), PublishError> {
        let Some(conn) = self.handle.as_mut() else {
            return Err(PublishError::connection_lost("not connected"));
        };

        let result = conn.publish(channel.as_str(), line.as_bytes()).await;
        if matches!(&result, Err(e) if e.is_connection_lost()) {
            self.handle = None;
        }
        result
    }
}
