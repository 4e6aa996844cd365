// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO hand-off between the blocking tail thread and async tasks.

use flume::r#async::RecvStream;
use flume::{Receiver, Sender};
use std::fmt;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    Disconnected,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "channel disconnected"),
        }
    }
}

impl std::error::Error for SendError {}

impl<T> BoundedSender<T> {
    /// Blocking send - blocks until there is capacity in the channel.
    /// Use this from non-async contexts (e.g., dedicated OS threads).
    pub fn send_blocking(&self, item: T) -> Result<(), SendError> {
        self.tx.send(item).map_err(|_| SendError::Disconnected)
    }

    /// Whether the receiving side has gone away.
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_disconnected()
    }
}

pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    pub fn into_stream(self) -> RecvStream<'static, T> {
        self.rx.into_stream()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);
    (BoundedSender { tx }, BoundedReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::{SendError, bounded};
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task::spawn};

    #[tokio::test]
    async fn preserves_send_order_across_threads() {
        let (tx, rx) = bounded(4);

        let producer = std::thread::spawn(move || {
            for i in 0..100u32 {
                tx.send_blocking(i).unwrap();
            }
        });

        let received: Vec<u32> = rx.into_stream().collect().await;
        producer.join().unwrap();

        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn blocking_sender_waits_for_capacity() {
        let (tx, rx) = bounded(1);
        tx.send_blocking(1u8).unwrap();

        let sent = Arc::new(AtomicBool::new(false));
        let producer = {
            let sent = sent.clone();
            std::thread::spawn(move || {
                tx.send_blocking(2).unwrap();
                sent.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!sent.load(Ordering::SeqCst));

        let mut stream = rx.into_stream();
        let mut first = spawn(stream.next());
        assert_eq!(Some(1), assert_ready!(first.poll()));
        drop(first);

        producer.join().unwrap();
        assert!(sent.load(Ordering::SeqCst));
        let mut second = spawn(stream.next());
        assert_eq!(Some(2), assert_ready!(second.poll()));
    }

    #[test]
    fn empty_stream_is_pending_until_senders_drop() {
        let (tx, rx) = bounded::<u8>(1);
        let mut stream = rx.into_stream();

        let mut next = spawn(stream.next());
        assert_pending!(next.poll());
        drop(tx);
        assert!(next.is_woken());
        assert_eq!(None, assert_ready!(next.poll()));
    }

    #[test]
    fn blocking_send_fails_once_receiver_dropped() {
        let (tx, rx) = bounded::<u8>(1);
        assert!(!tx.is_disconnected());
        drop(rx);
        assert!(tx.is_disconnected());
        assert_eq!(Err(SendError::Disconnected), tx.send_blocking(7));
    }
}
