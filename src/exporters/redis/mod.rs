// SPDX-License-Identifier: Apache-2.0

//! Redis pub/sub publishing.

mod client;
mod config;
mod errors;
mod manager;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{Connection, Connector, RedisConnection, RedisConnector};
pub use config::BrokerConfig;
pub use errors::{BrokerError, Cancelled, PublishError, PublishErrorKind};
pub use manager::ConnectionManager;
