// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::time::Duration;

use redis::RedisError;
use redis::aio::MultiplexedConnection;
use tracing::trace;

use super::config::BrokerConfig;
use super::errors::{BrokerError, PublishError, PublishErrorKind};

/// Opens connections to the broker. A returned connection has passed a
/// health check.
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Address for diagnostics.
    fn address(&self) -> &str;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, BrokerError>> + Send;
}

/// A live broker connection.
pub trait Connection: Send {
    /// Publish one payload to one channel. Never retries.
    fn publish(
        &mut self,
        channel: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

pub struct RedisConnector {
    client: redis::Client,
    address: String,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl RedisConnector {
    /// Fails only if the address cannot be parsed; nothing is dialled yet.
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client = redis::Client::open(config.address.as_str()).map_err(|e| {
            BrokerError::InvalidAddress {
                address: config.address.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            client,
            address: config.address.clone(),
            connect_timeout: config.connect_timeout,
            response_timeout: config.response_timeout,
        })
    }
}

impl Connector for RedisConnector {
    type Connection = RedisConnection;

    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<RedisConnection, BrokerError> {
        let handshake = async {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| BrokerError::Connect(e.to_string()))?;

            let pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| BrokerError::HealthCheck(e.to_string()))?;
            if pong != "PONG" {
                return Err(BrokerError::HealthCheck(format!(
                    "unexpected reply to PING: {:?}",
                    pong
                )));
            }

            Ok(conn)
        };

        let conn = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| BrokerError::Timeout(self.connect_timeout))??;

        Ok(RedisConnection {
            conn,
            response_timeout: self.response_timeout,
        })
    }
}

pub struct RedisConnection {
    conn: MultiplexedConnection,
    response_timeout: Duration,
}

impl Connection for RedisConnection {
    async fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<(), PublishError> {
        let mut cmd = redis::cmd("PUBLISH");
        cmd.arg(channel).arg(payload);

        let reply: redis::RedisResult<i64> =
            match tokio::time::timeout(self.response_timeout, cmd.query_async(&mut self.conn))
                .await
            {
                Ok(reply) => reply,
                Err(_) => {
                    return Err(PublishError::connection_lost(format!(
                        "no reply within {:?}",
                        self.response_timeout
                    )));
                }
            };

        match reply {
            Ok(receivers) => {
                trace!(channel, receivers, "Published line");
                Ok(())
            }
            Err(e) => Err(PublishError {
                kind: classify(&e),
                reason: e.to_string(),
            }),
        }
    }
}

fn classify(e: &RedisError) -> PublishErrorKind {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        PublishErrorKind::ConnectionLost
    } else {
        PublishErrorKind::BrokerRejected
    }
}
