// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use thiserror::Error;

/// Errors establishing a broker connection. All of them are retried by
/// the connection manager except `InvalidAddress`.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Invalid broker address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    #[error("Broker health check failed: {0}")]
    HealthCheck(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Why a single publish failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    /// The connection is gone; a new one is needed.
    ConnectionLost,
    /// The broker answered with an error; the connection is still usable.
    BrokerRejected,
}

impl fmt::Display for PublishErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishErrorKind::ConnectionLost => write!(f, "connection lost"),
            PublishErrorKind::BrokerRejected => write!(f, "broker rejected"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Publish failed ({kind}): {reason}")]
pub struct PublishError {
    pub kind: PublishErrorKind,
    pub reason: String,
}

impl PublishError {
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self {
            kind: PublishErrorKind::ConnectionLost,
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            kind: PublishErrorKind::BrokerRejected,
            reason: reason.into(),
        }
    }

    pub fn is_connection_lost(&self) -> bool {
        self.kind == PublishErrorKind::ConnectionLost
    }
}

/// Returned by a connect loop that was stopped by shutdown.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Broker connect cancelled")]
pub struct Cancelled;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_error_display() {
        let e = PublishError::rejected("WRONGTYPE");
        assert_eq!(e.to_string(), "Publish failed (broker rejected): WRONGTYPE");
        assert!(!e.is_connection_lost());
        assert!(PublishError::connection_lost("reset").is_connection_lost());
    }
}
