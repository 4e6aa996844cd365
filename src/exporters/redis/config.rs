// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::exporters::retry::RetryConfig;

/// Configuration for the Redis broker connection
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Broker URL, `redis://host:port[/db]`
    pub address: String,

    /// Delay between connection attempts
    pub retry: RetryConfig,

    /// Upper bound on establishing one connection, health check included
    pub connect_timeout: Duration,

    /// Upper bound on a single publish round trip
    pub response_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "redis://redis:6379".to_string(),
            retry: RetryConfig::default(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
        }
    }
}

impl BrokerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.address.is_empty() {
            return Err("broker address must not be empty".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("connect timeout must be positive".to_string());
        }
        if self.response_timeout.is_zero() {
            return Err("response timeout must be positive".to_string());
        }
        self.retry.validate()
    }
}
