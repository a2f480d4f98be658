//! Producer/consumer handoff between an operation and its caller.
//!
//! An operation runs on its own task and pushes events through an
//! [`Emitter`] into a bounded queue; the caller drains the matching
//! [`OpStream`] concurrently and reads the terminal status last.
//!
//! Guarantees:
//! - events arrive in the order they were emitted;
//! - the stream ends exactly once, when the operation returns and its
//!   emitter is dropped;
//! - the terminal status is only available after the stream has ended;
//! - nothing is emitted once cancellation has been observed.

use std::future::Future;

use kiln_store::CancelToken;
use tokio::sync::{mpsc, oneshot};

use crate::error::{MaintError, MaintResult};

/// Why an [`Emitter::emit`] call did not deliver its event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupted {
    /// The cancel token fired.
    Cancelled,
    /// The consumer dropped its end of the stream.
    ConsumerGone,
}

/// Producer half, owned by the running operation.
#[derive(Debug)]
pub struct Emitter<T> {
    tx: mpsc::Sender<T>,
    cancel: CancelToken,
    delivered: u64,
}

impl<T> Emitter<T> {
    /// Hand one event to the consumer.
    ///
    /// Waits until the consumer has room for it or cancellation fires,
    /// whichever comes first. When both are ready, cancellation wins.
    pub async fn emit(&mut self, event: T) -> Result<(), Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| Interrupted::ConsumerGone),
        };
        if outcome.is_ok() {
            self.delivered += 1;
        }
        outcome
    }

    /// Number of events accepted by the consumer so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Consumer half: ordered events followed by one terminal status.
#[derive(Debug)]
pub struct OpStream<T> {
    events: mpsc::Receiver<T>,
    status: oneshot::Receiver<MaintResult<()>>,
}

impl<T: Send + 'static> OpStream<T> {
    /// Run `op` on a new task, wired to a queue of `capacity` events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F, Fut>(capacity: usize, cancel: CancelToken, op: F) -> Self
    where
        F: FnOnce(Emitter<T>) -> Fut,
        Fut: Future<Output = MaintResult<()>> + Send + 'static,
    {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let (status_tx, status) = oneshot::channel();
        let emitter = Emitter {
            tx,
            cancel,
            delivered: 0,
        };
        let operation = op(emitter);
        tokio::spawn(async move {
            // The emitter lives inside `operation`, so the queue is closed
            // before the status is sent.
            let result = operation.await;
            let _ = status_tx.send(result);
        });
        Self { events, status }
    }

    /// The next event, or `None` once the operation has stopped emitting.
    pub async fn next(&mut self) -> Option<T> {
        self.events.recv().await
    }

    /// Discard undelivered events and wait for the terminal status.
    ///
    /// Dropping the queue interrupts an operation that is still emitting.
    pub async fn finish(self) -> MaintResult<()> {
        let Self { events, status } = self;
        drop(events);
        match status.await {
            Ok(result) => result,
            Err(_) => Err(MaintError::Internal(
                "operation ended without reporting a status".into(),
            )),
        }
    }

    /// Drain every event, then return them with the terminal status.
    pub async fn collect(mut self) -> (Vec<T>, MaintResult<()>) {
        let mut out = Vec::new();
        while let Some(event) = self.next().await {
            out.push(event);
        }
        let status = self.finish().await;
        (out, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_store::cancel_pair;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_order_then_status() {
        let stream = OpStream::spawn(2, CancelToken::never(), |mut emitter| async move {
            for i in 0..10u32 {
                emitter.emit(i).await.unwrap();
            }
            assert_eq!(emitter.delivered(), 10);
            Ok(())
        });
        let (events, status) = stream.collect().await;
        assert_eq!(events, (0..10).collect::<Vec<_>>());
        assert!(status.is_ok());
    }

    #[tokio::test]
    async fn error_status_follows_events() {
        let stream: OpStream<u32> = OpStream::spawn(4, CancelToken::never(), |mut emitter| async move {
            emitter.emit(1).await.unwrap();
            Err(MaintError::Cancelled)
        });
        let (events, status) = stream.collect().await;
        assert_eq!(events, vec![1]);
        assert!(matches!(status, Err(MaintError::Cancelled)));
    }

    #[tokio::test]
    async fn nothing_is_emitted_after_cancellation() {
        let (handle, token) = cancel_pair();
        let mut stream = OpStream::spawn(1, token, |mut emitter| async move {
            let mut i = 0u32;
            loop {
                if emitter.emit(i).await.is_err() {
                    assert!(emitter.is_cancelled());
                    return Ok(());
                }
                i += 1;
            }
        });
        assert_eq!(stream.next().await, Some(0));
        handle.cancel();
        // At most one event was already queued before the signal.
        let mut rest = Vec::new();
        while let Some(event) = stream.next().await {
            rest.push(event);
        }
        assert!(rest.len() <= 1);
        assert!(stream.finish().await.is_ok());
    }

    #[tokio::test]
    async fn emit_after_cancel_is_refused_immediately() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        let stream = OpStream::spawn(1, token, |mut emitter| async move {
            assert_eq!(emitter.emit(7u8).await, Err(Interrupted::Cancelled));
            Ok(())
        });
        let (events, status) = stream.collect().await;
        assert!(events.is_empty());
        assert!(status.is_ok());
    }

    #[tokio::test]
    async fn dropped_consumer_interrupts_producer() {
        let saw_gone = Arc::new(AtomicBool::new(false));
        let flag = saw_gone.clone();
        let stream = OpStream::spawn(1, CancelToken::never(), move |mut emitter| async move {
            loop {
                if let Err(reason) = emitter.emit(0u8).await {
                    flag.store(reason == Interrupted::ConsumerGone, Ordering::SeqCst);
                    return Ok(());
                }
            }
        });
        tokio::time::timeout(Duration::from_secs(1), stream.finish())
            .await
            .expect("producer should stop")
            .unwrap();
        assert!(saw_gone.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_operation_reports_internal_error() {
        let stream: OpStream<u8> = OpStream::spawn(1, CancelToken::never(), |_emitter| async move {
            let missing: Option<()> = None;
            missing.expect("boom");
            Ok(())
        });
        let (events, status) = stream.collect().await;
        assert!(events.is_empty());
        assert!(matches!(status, Err(MaintError::Internal(_))));
    }
}
