// SPDX-License-Identifier: Apache-2.0

//! The tail stream: a dedicated OS thread follows the file and hands
//! complete lines to the async side over a bounded channel.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use futures::stream::{BoxStream, Stream, StreamExt};
use tracing::{debug, error, info, trace, warn};

use super::config::TailConfig;
use super::error::{Error, Result};
use super::follower::Follower;
use super::parent_dir;
use super::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use super::watcher::{
    AnyWatcher, Wake, WatchMode, WatcherConfig, WatcherError, create_watcher, fallback_watcher,
};
use crate::bounded_channel::{self, BoundedSender};
use crate::topology::payload::LogLine;

/// Watcher errors are tolerated this long before switching to polling.
const MAX_WATCHER_ERROR_DURATION: Duration = Duration::from_secs(5);

/// How long [`TailStream::close`] waits for the reader thread.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// An endless, ordered stream of the lines appended to one file.
///
/// Lines are yielded once their terminating newline has been written. The
/// stream survives rotation, truncation and the file not existing yet. It
/// ends only when the stream is closed, or at end of file when `follow` is
/// off.
pub struct TailStream {
    path: PathBuf,
    lines: Option<BoxStream<'static, LogLine>>,
    shutdown: ShutdownTrigger,
    handle: Option<JoinHandle<()>>,
}

impl TailStream {
    /// Start following `path`.
    ///
    /// Fails if the configuration is invalid or the directory that should
    /// hold the file does not exist. A missing file is fine and is waited
    /// for, but a file that exists and cannot be opened or read is a
    /// startup error (`Error::Io`). Read errors after startup are logged
    /// and retried.
    pub fn open(path: impl AsRef<Path>, config: TailConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        let path = path.as_ref().to_path_buf();
        let dir = parent_dir(&path);
        if !dir.is_dir() {
            return Err(Error::NotFound(dir));
        }
        if path.is_dir() {
            return Err(Error::Config(format!(
                "{} is a directory, expected a file",
                path.display()
            )));
        }

        let (trigger, signal) = shutdown::channel();
        let watcher_config = config.watcher_config();
        let watcher = start_watcher(&watcher_config, &path, signal.clone())?;

        let mut follower = Follower::new(path.clone(), &config);
        follower.open_initial(config.start_at)?;

        info!(
            path = ?path,
            backend = watcher.backend_name(),
            start_at = ?config.start_at,
            follow = config.follow,
            reopen = config.reopen,
            "Tail reader started"
        );

        let (lines_tx, lines_rx) = bounded_channel::bounded(config.line_queue_size);
        let worker = TailWorker {
            follower,
            watcher,
            watcher_config,
            watcher_first_error: None,
            read_first_failure: None,
            shutdown: signal,
            lines_tx,
            follow: config.follow,
            poll_interval: config.poll_interval,
        };

        let handle = std::thread::Builder::new()
            .name("tail-reader".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            path,
            lines: Some(lines_rx.into_stream().boxed()),
            shutdown: trigger,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next complete line. `None` once the stream has ended.
    pub async fn next_line(&mut self) -> Option<LogLine> {
        self.next().await
    }

    /// Stop the reader thread and release the file.
    pub async fn close(mut self) -> Result<()> {
        self.lines.take();
        self.shutdown.fire();

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(
            JOIN_TIMEOUT,
            tokio::task::spawn_blocking(move || handle.join()),
        )
        .await
        {
            Ok(Ok(Ok(()))) => {
                debug!("Tail reader thread joined");
                Ok(())
            }
            Ok(Ok(Err(_))) => {
                error!("Tail reader thread panicked");
                Err(Error::ReaderPanicked)
            }
            Ok(Err(e)) => {
                error!("Failed to join tail reader thread: {}", e);
                Err(Error::ReaderPanicked)
            }
            Err(_) => {
                warn!("Timeout waiting for tail reader thread to join");
                Ok(())
            }
        }
    }
}

impl Stream for TailStream {
    type Item = LogLine;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LogLine>> {
        match self.lines.as_mut() {
            Some(lines) => lines.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for TailStream {
    fn drop(&mut self) {
        // Receiver first, so a reader blocked on a full queue wakes up too.
        self.lines.take();
        self.shutdown.fire();
    }
}

fn start_watcher(
    config: &WatcherConfig,
    path: &Path,
    shutdown: ShutdownSignal,
) -> std::result::Result<AnyWatcher, WatcherError> {
    let mut watcher = create_watcher(config, shutdown.clone())?;
    match watcher.watch(path) {
        Ok(()) => Ok(watcher),
        Err(e) if config.mode == WatchMode::Auto && watcher.is_native() => {
            warn!(
                "Native watch of {:?} failed ({}), falling back to polling",
                path, e
            );
            let mut watcher = fallback_watcher(config, shutdown);
            watcher.watch(path)?;
            Ok(watcher)
        }
        Err(e) => Err(e),
    }
}

struct TailWorker {
    follower: Follower,
    watcher: AnyWatcher,
    watcher_config: WatcherConfig,
    watcher_first_error: Option<Instant>,
    read_first_failure: Option<Instant>,
    shutdown: ShutdownSignal,
    lines_tx: BoundedSender<LogLine>,
    follow: bool,
    poll_interval: Duration,
}

impl TailWorker {
    fn run(mut self) {
        loop {
            if self.shutdown.is_triggered() || self.lines_tx.is_disconnected() {
                debug!(path = ?self.follower.path(), "Tail reader shutting down");
                return;
            }

            if !self.read() {
                debug!("Line consumer went away, stopping tail reader");
                return;
            }

            if !self.follow {
                if let Some(line) = self.follower.finish() {
                    let _ = self.lines_tx.send_blocking(line);
                }
                info!(path = ?self.follower.path(), "Reached end of file, tail reader done");
                return;
            }

            if !self.wait_for_change() {
                debug!(path = ?self.follower.path(), "Tail reader shutting down");
                return;
            }
        }
    }

    /// Returns false when the consumer is gone.
    fn read(&mut self) -> bool {
        let lines_tx = &self.lines_tx;
        match self
            .follower
            .check(&mut |line| lines_tx.send_blocking(line).is_ok())
        {
            Ok(more) => {
                if self.read_first_failure.take().is_some() {
                    info!(path = ?self.follower.path(), "File reads recovered");
                }
                more
            }
            Err(e) => {
                let first_failure = *self.read_first_failure.get_or_insert_with(Instant::now);
                warn!(
                    path = ?self.follower.path(),
                    "Failed to read file (failures started {:?} ago), will retry: {}",
                    first_failure.elapsed(),
                    e
                );
                true
            }
        }
    }

    /// Block until the file may have changed or a poll interval passes.
    /// Returns false on shutdown.
    fn wait_for_change(&mut self) -> bool {
        match self.watcher.wait(self.poll_interval) {
            Ok(wake) => {
                if self.watcher_first_error.take().is_some() {
                    debug!("Watcher recovered after previous errors");
                }
                trace!(?wake, backend = self.watcher.backend_name(), "Tail reader woke up");
                wake != Wake::Shutdown
            }
            Err(e) => {
                let first_error = *self.watcher_first_error.get_or_insert_with(Instant::now);
                let error_duration = first_error.elapsed();

                if !self.watcher.is_native() || error_duration < MAX_WATCHER_ERROR_DURATION {
                    warn!(
                        "Watcher error (errors started {:?} ago): {}",
                        error_duration, e
                    );
                    // Keep the loop from spinning on a watcher that fails fast.
                    return !self.shutdown.wait_timeout(self.poll_interval);
                }

                warn!(
                    "Watcher errors persisted for {:?}, falling back to polling mode: {}",
                    error_duration, e
                );
                let mut watcher = fallback_watcher(&self.watcher_config, self.shutdown.clone());
                match watcher.watch(self.follower.path()) {
                    Ok(()) => {
                        self.watcher = watcher;
                        self.watcher_first_error = None;
                        info!("Switched to polling mode");
                    }
                    Err(poll_err) => error!("Failed to create poll watcher: {}", poll_err),
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::tail::config::StartAt;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config() -> TailConfig {
        TailConfig {
            poll_interval: Duration::from_millis(20),
            watch_mode: WatchMode::Poll,
            ..Default::default()
        }
    }

    fn append(path: &Path, data: &str) {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(data.as_bytes()).unwrap();
        f.flush().unwrap();
    }

    async fn next(stream: &mut TailStream, within: Duration) -> Option<String> {
        tokio::time::timeout(within, stream.next_line())
            .await
            .ok()
            .flatten()
            .map(|l| String::from_utf8(l.as_bytes().to_vec()).unwrap())
    }

    async fn take(stream: &mut TailStream, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(next(stream, WAIT).await.expect("line within timeout"));
        }
        out
    }

    #[tokio::test]
    async fn yields_lines_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        append(&path, "l0\nl1\n");

        let mut stream = TailStream::open(&path, test_config()).unwrap();
        for i in 2..50 {
            append(&path, &format!("l{}\n", i));
        }

        let expected: Vec<String> = (0..50).map(|i| format!("l{}", i)).collect();
        assert_eq!(take(&mut stream, 50).await, expected);
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn never_yields_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        let mut stream = TailStream::open(&path, test_config()).unwrap();

        append(&path, "{\"file\":\"a.txt\"");
        assert_eq!(next(&mut stream, Duration::from_millis(150)).await, None);

        append(&path, "}\n");
        assert_eq!(
            next(&mut stream, WAIT).await.as_deref(),
            Some("{\"file\":\"a.txt\"}")
        );
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn waits_for_file_to_be_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.log");
        let mut stream = TailStream::open(&path, test_config()).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        append(&path, "hello\n");
        assert_eq!(next(&mut stream, WAIT).await.as_deref(), Some("hello"));
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn recovers_after_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        append(&path, "before\n");

        let mut stream = TailStream::open(&path, test_config()).unwrap();
        assert_eq!(take(&mut stream, 1).await, vec!["before"]);

        fs::rename(&path, dir.path().join("changes_log.json.1")).unwrap();
        append(&path, "r1\nr2\nr3\n");

        assert_eq!(take(&mut stream, 3).await, vec!["r1", "r2", "r3"]);
        assert_eq!(next(&mut stream, Duration::from_millis(100)).await, None);
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn rotation_recovery_is_bounded_by_poll_interval() {
        let poll_interval = Duration::from_millis(200);
        let config = TailConfig {
            poll_interval,
            ..test_config()
        };
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        append(&path, "before\n");

        let mut stream = TailStream::open(&path, config).unwrap();
        assert_eq!(take(&mut stream, 1).await, vec!["before"]);

        fs::rename(&path, dir.path().join("changes_log.json.1")).unwrap();
        append(&path, "r1\nr2\n");
        let rotated_at = Instant::now();

        assert_eq!(take(&mut stream, 2).await, vec!["r1", "r2"]);
        let elapsed = rotated_at.elapsed();
        assert!(
            elapsed < poll_interval * 2 + Duration::from_millis(200),
            "rotation picked up after {:?}",
            elapsed
        );
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn recovers_after_truncation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        append(&path, "a fairly long first line\n");

        let mut stream = TailStream::open(&path, test_config()).unwrap();
        assert_eq!(take(&mut stream, 1).await.len(), 1);

        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        append(&path, "short\n");

        assert_eq!(take(&mut stream, 1).await, vec!["short"]);
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn start_at_end_skips_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        append(&path, "history\n");

        let config = TailConfig {
            start_at: StartAt::End,
            ..test_config()
        };
        let mut stream = TailStream::open(&path, config).unwrap();
        append(&path, "live\n");

        assert_eq!(take(&mut stream, 1).await, vec!["live"]);
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn without_follow_ends_at_eof() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        append(&path, "one\ntwo\nunterminated");

        let config = TailConfig {
            follow: false,
            ..test_config()
        };
        let mut stream = TailStream::open(&path, config).unwrap();
        let all: Vec<LogLine> = tokio::time::timeout(WAIT, (&mut stream).collect())
            .await
            .unwrap();
        assert_eq!(
            all,
            vec![
                LogLine::from("one"),
                LogLine::from("two"),
                LogLine::from("unterminated")
            ]
        );
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no_such_dir").join("changes_log.json");

        match TailStream::open(&path, test_config()) {
            Err(Error::NotFound(missing)) => assert_eq!(missing, dir.path().join("no_such_dir")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_at_startup_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        // A socket cannot be opened as a file, not even by root.
        let _socket = std::os::unix::net::UnixListener::bind(&path).unwrap();

        assert!(matches!(
            TailStream::open(&path, test_config()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = TailConfig {
            line_queue_size: 0,
            ..test_config()
        };
        assert!(matches!(
            TailStream::open(dir.path().join("x.log"), config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn parent_dir_of_bare_file_name_is_cwd() {
        assert_eq!(parent_dir(Path::new("changes.log")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/a/b.log")), PathBuf::from("/a"));
    }

    #[tokio::test]
    async fn close_is_prompt_with_long_poll_interval() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        let config = TailConfig {
            poll_interval: Duration::from_secs(30),
            ..test_config()
        };
        let stream = TailStream::open(&path, config).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let start = Instant::now();
        stream.close().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn native_watcher_picks_up_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        let config = TailConfig {
            watch_mode: WatchMode::Auto,
            poll_interval: Duration::from_millis(100),
            ..Default::default()
        };
        let mut stream = TailStream::open(&path, config).unwrap();

        append(&path, "via notify\n");
        assert_eq!(take(&mut stream, 1).await, vec!["via notify"]);
        stream.close().await.unwrap();
    }
}
