//! Synchronous store work moved onto Tokio's blocking pool.
//!
//! Datastore calls are plain blocking I/O. A [`BlockingFeed`] runs them on
//! `spawn_blocking` and hands each result to async code through a bounded
//! channel, so the async side keeps its own `select!` on cancellation.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::error::{StoreError, StoreResult};

/// Producer half, used from the blocking closure.
#[derive(Debug)]
pub struct FeedSender<T> {
    tx: mpsc::Sender<T>,
    cancel: CancelToken,
}

impl<T> FeedSender<T> {
    /// Hand one item to the async side, waiting for room.
    ///
    /// Returns `false` once cancellation has fired or the receiver is gone;
    /// the producer should stop.
    pub fn send(&self, item: T) -> bool {
        !self.cancel.is_cancelled() && self.tx.blocking_send(item).is_ok()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Items produced by a blocking closure, plus the closure's final result.
#[derive(Debug)]
pub struct BlockingFeed<T, R> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<StoreResult<R>>,
}

impl<T, R> BlockingFeed<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Run `work` on the blocking pool. Must be called within a Tokio runtime.
    pub fn spawn<F>(capacity: usize, cancel: CancelToken, work: F) -> Self
    where
        F: FnOnce(FeedSender<T>) -> StoreResult<R> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sender = FeedSender { tx, cancel };
        let task = tokio::task::spawn_blocking(move || work(sender));
        Self { rx, task }
    }

    /// The next item, or `None` once the closure has returned.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Discard pending items and wait for the closure's result.
    ///
    /// Dropping the receiver unblocks a producer waiting in
    /// [`FeedSender::send`].
    pub async fn finish(self) -> StoreResult<R> {
        let Self { rx, task } = self;
        drop(rx);
        task.await.map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;

    #[tokio::test]
    async fn items_then_result() {
        let mut feed = BlockingFeed::spawn(1, CancelToken::never(), |sender| {
            for i in 0..5u32 {
                assert!(sender.send(i));
            }
            Ok("done")
        });
        let mut seen = Vec::new();
        while let Some(i) = feed.recv().await {
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(feed.finish().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn error_result_is_returned_after_items() {
        let mut feed: BlockingFeed<u8, ()> = BlockingFeed::spawn(4, CancelToken::never(), |sender| {
            sender.send(1);
            Err(StoreError::ReadOnly)
        });
        assert_eq!(feed.recv().await, Some(1));
        assert!(feed.recv().await.is_none());
        assert!(matches!(feed.finish().await, Err(StoreError::ReadOnly)));
    }

    #[tokio::test]
    async fn finish_unblocks_a_waiting_producer() {
        let mut feed = BlockingFeed::spawn(1, CancelToken::never(), |sender| {
            let mut sent = 0u32;
            while sender.send(sent) {
                sent += 1;
            }
            Ok(sent)
        });
        assert_eq!(feed.recv().await, Some(0));
        let sent = feed.finish().await.unwrap();
        assert!(sent < 10);
    }

    #[tokio::test]
    async fn cancelled_sender_refuses_items() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        let feed = BlockingFeed::spawn(1, token, |sender| {
            assert!(sender.is_cancelled());
            Ok(sender.send(()))
        });
        assert!(!feed.finish().await.unwrap());
    }
}
