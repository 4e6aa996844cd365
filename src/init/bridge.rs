// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::BoxError;
use super::args::BridgeArgs;
use super::wait;
use crate::exporters::redis::{ConnectionManager, Connector, RedisConnector};
use crate::receivers::tail::{TailConfig, TailStream};
use crate::topology::forwarder::{ForwardStats, Forwarder};
use crate::topology::payload::ChannelName;

/// Grace period for the forwarding task after cancellation
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// The tail-to-broker bridge assembled from command line arguments.
pub struct Bridge {
    config: BridgeArgs,
}

impl Bridge {
    pub fn new(config: BridgeArgs) -> Self {
        Self { config }
    }

    /// Validate the configuration, then forward until `cancel` fires.
    ///
    /// Errors are startup errors: an invalid broker address, an invalid
    /// channel or tail configuration, or a missing file directory. Once the
    /// bridge runs, broker and file problems are retried and logged.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BoxError> {
        let config = self.config;

        info!(
            file_path = ?config.file_path,
            channel = %config.channel,
            broker = %config.broker_address,
            "Starting tailbridge."
        );

        let channel = config.channel()?;
        let broker_config = config.broker_config();
        broker_config.validate()?;
        let connector = RedisConnector::new(&broker_config)?;
        let manager = ConnectionManager::new(connector, broker_config.retry.clone());

        let stream = TailStream::open(&config.file_path, config.tail_config())?;

        let mut task_set = JoinSet::new();
        let forward_cancel = cancel.child_token();
        {
            let token = forward_cancel.clone();
            task_set.spawn(async move {
                forward(stream, manager, channel, token).await.map(|_| ())
            });
        }

        select! {
            _ = cancel.cancelled() => {
                debug!("Bridge cancellation signaled.");
            },
            e = wait::wait_for_any_task(&mut task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of forwarder."),
                    Err(e) => return Err(e),
                }
            },
        }

        forward_cancel.cancel();
        wait::wait_for_tasks_with_timeout(&mut task_set, SHUTDOWN_TIMEOUT).await
    }
}

/// Open `file_path` and forward its lines through `manager` until
/// `cancel` fires or the stream ends.
pub async fn run_pipeline<C>(
    file_path: &Path,
    tail_config: TailConfig,
    manager: ConnectionManager<C>,
    channel: ChannelName,
    cancel: CancellationToken,
) -> Result<ForwardStats, BoxError>
where
    C: Connector,
{
    let stream = TailStream::open(file_path, tail_config)?;
    forward(stream, manager, channel, cancel).await
}

async fn forward<C>(
    mut stream: TailStream,
    manager: ConnectionManager<C>,
    channel: ChannelName,
    cancel: CancellationToken,
) -> Result<ForwardStats, BoxError>
where
    C: Connector,
{
    let mut forwarder = Forwarder::new(manager, channel);
    let stats = forwarder.run(&mut stream, &cancel).await;

    // Stops the reader thread; lines still queued are abandoned.
    stream.close().await?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::tail;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_directory_fails_startup() {
        let dir = TempDir::new().unwrap();
        let args = BridgeArgs {
            file_path: dir.path().join("missing").join("changes_log.json"),
            ..Default::default()
        };

        let err = Bridge::new(args)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<tail::Error>(),
            Some(tail::Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_broker_address_fails_startup() {
        let dir = TempDir::new().unwrap();
        let args = BridgeArgs {
            file_path: dir.path().join("changes_log.json"),
            broker_address: "definitely not a url".to_string(),
            ..Default::default()
        };

        assert!(Bridge::new(args).run(CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn cancellation_while_broker_unreachable_is_clean() {
        let dir = TempDir::new().unwrap();
        let args = BridgeArgs {
            file_path: dir.path().join("changes_log.json"),
            broker_address: "redis://127.0.0.1:1".to_string(),
            broker_retry_initial_backoff: Duration::from_millis(20),
            broker_retry_max_backoff: Duration::from_millis(20),
            broker_connect_timeout: Duration::from_millis(200),
            ..Default::default()
        };

        let cancel = CancellationToken::new();
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            c.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), Bridge::new(args).run(cancel))
            .await
            .unwrap()
            .unwrap();
    }
}
