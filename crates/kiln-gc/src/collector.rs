use std::collections::HashSet;
use std::sync::Arc;

use kiln_store::{BlockStore, BlockingFeed, CancelToken, FeedSender, StoreError, StoreResult};
use kiln_types::BlockKey;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::event::GcEvent;
use crate::pins::PinSource;

/// Counters for a finished sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub removed: u64,
    pub failed: u64,
    pub kept: u64,
    /// The sweep stopped early (cancellation or a dropped receiver).
    pub interrupted: bool,
}

/// A running sweep: its event stream plus the task producing it.
#[derive(Debug)]
pub struct Sweep {
    pub events: mpsc::Receiver<GcEvent>,
    task: JoinHandle<StoreResult<SweepSummary>>,
}

impl Sweep {
    /// Wrap an event receiver and the task feeding it.
    pub fn new(
        events: mpsc::Receiver<GcEvent>,
        task: JoinHandle<StoreResult<SweepSummary>>,
    ) -> Self {
        Self { events, task }
    }

    /// Stop consuming and wait for the producer to finish.
    ///
    /// Undelivered events are discarded, which also tells the producer to
    /// stop. An error means the sweep itself failed (for example the key
    /// enumeration broke), not that individual blocks failed.
    pub async fn finish(self) -> StoreResult<SweepSummary> {
        let Self { events, task } = self;
        drop(events);
        task.await.map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Decides what is garbage and deletes it.
///
/// Implementations must emit exactly one event per block they attempt to
/// delete, after the attempt completes, and must stop promptly once the
/// cancel token fires or the receiver is dropped.
pub trait Collector: Send + Sync {
    /// Start a sweep. Must be called from within a Tokio runtime.
    ///
    /// Returns an error, and starts nothing, if the sweep cannot begin.
    fn sweep(&self, cancel: CancelToken) -> StoreResult<Sweep>;
}

/// Deletes every block that its pin source does not name.
pub struct PinnedSetCollector {
    store: Arc<dyn BlockStore>,
    pins: Arc<dyn PinSource>,
    capacity: usize,
}

impl PinnedSetCollector {
    pub fn new(store: Arc<dyn BlockStore>, pins: Arc<dyn PinSource>) -> Self {
        Self {
            store,
            pins,
            capacity: 16,
        }
    }

    /// Capacity of the event channel (minimum 1).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl Collector for PinnedSetCollector {
    fn sweep(&self, cancel: CancelToken) -> StoreResult<Sweep> {
        let pins = self.pins.pinned()?;
        let store = Arc::clone(&self.store);
        let (tx, rx) = mpsc::channel(self.capacity);
        debug!(pinned = pins.len(), "starting sweep");

        let task = tokio::spawn(async move {
            let mut feed = BlockingFeed::spawn(1, cancel.clone(), move |sender| {
                delete_unpinned(store.as_ref(), &pins, &sender)
            });
            let mut interrupted = false;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = feed.recv() => next,
                };
                let Some(event) = next else { break };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        interrupted = true;
                        break;
                    }
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            interrupted = true;
                            break;
                        }
                    }
                }
            }

            let mut summary = feed.finish().await?;
            summary.interrupted |= interrupted || cancel.is_cancelled();
            info!(
                removed = summary.removed,
                failed = summary.failed,
                kept = summary.kept,
                interrupted = summary.interrupted,
                "sweep finished"
            );
            Ok::<_, StoreError>(summary)
        });

        Ok(Sweep::new(rx, task))
    }
}

/// Blocking half of a sweep: enumerate, delete, report.
fn delete_unpinned(
    store: &dyn BlockStore,
    pins: &HashSet<BlockKey>,
    sender: &FeedSender<GcEvent>,
) -> StoreResult<SweepSummary> {
    let mut summary = SweepSummary::default();
    for key in store.all_keys(sender.cancel_token())? {
        let key = key?;
        if sender.is_cancelled() {
            summary.interrupted = true;
            break;
        }
        if pins.contains(&key) {
            summary.kept += 1;
            continue;
        }
        let event = match store.delete(&key) {
            Ok(()) => {
                summary.removed += 1;
                GcEvent::Removed { key }
            }
            Err(cause) => {
                summary.failed += 1;
                GcEvent::Failed { key, cause }
            }
        };
        if !sender.send(event) {
            summary.interrupted = true;
            break;
        }
    }
    Ok(summary)
}

impl std::fmt::Debug for PinnedSetCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedSetCollector")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::StaticPins;
    use kiln_store::{cancel_pair, DatastoreBlockStore, InMemoryDatastore};

    fn populated(n: u8) -> (Arc<DatastoreBlockStore>, Vec<BlockKey>) {
        let store = Arc::new(DatastoreBlockStore::new(Arc::new(InMemoryDatastore::new())));
        let keys = (0..n).map(|i| store.put(&[i]).unwrap()).collect();
        (store, keys)
    }

    #[tokio::test]
    async fn removes_unpinned_and_keeps_pinned() {
        let (store, keys) = populated(5);
        let pins = StaticPins::new([keys[0], keys[3]]);
        let collector = PinnedSetCollector::new(store.clone(), Arc::new(pins));

        let mut sweep = collector.sweep(CancelToken::never()).unwrap();
        let mut removed = HashSet::new();
        while let Some(event) = sweep.events.recv().await {
            match event {
                GcEvent::Removed { key } => {
                    removed.insert(key);
                }
                GcEvent::Failed { key, cause } => panic!("unexpected failure for {key}: {cause}"),
            }
        }
        let summary = sweep.finish().await.unwrap();

        assert_eq!(removed, HashSet::from([keys[1], keys[2], keys[4]]));
        assert_eq!(summary.removed, 3);
        assert_eq!(summary.kept, 2);
        assert!(!summary.interrupted);
        assert!(store.has(&keys[0]).unwrap());
        assert!(!store.has(&keys[1]).unwrap());
    }

    #[tokio::test]
    async fn pin_source_failure_prevents_start() {
        struct BrokenPins;
        impl PinSource for BrokenPins {
            fn pinned(&self) -> StoreResult<HashSet<BlockKey>> {
                Err(StoreError::ReadOnly)
            }
        }
        let (store, keys) = populated(2);
        let collector = PinnedSetCollector::new(store.clone(), Arc::new(BrokenPins));
        assert!(matches!(
            collector.sweep(CancelToken::never()),
            Err(StoreError::ReadOnly)
        ));
        assert!(store.has(&keys[0]).unwrap());
    }

    #[tokio::test]
    async fn dropping_receiver_stops_sweep() {
        let (store, _keys) = populated(50);
        let collector =
            PinnedSetCollector::new(store.clone(), Arc::new(StaticPins::default())).with_capacity(1);
        let mut sweep = collector.sweep(CancelToken::never()).unwrap();
        assert!(sweep.events.recv().await.is_some());
        let summary = sweep.finish().await.unwrap();
        assert!(summary.interrupted);
        assert!(summary.removed < 50);
    }

    #[tokio::test]
    async fn cancellation_stops_sweep() {
        let (store, _keys) = populated(50);
        let collector =
            PinnedSetCollector::new(store.clone(), Arc::new(StaticPins::default())).with_capacity(1);
        let (handle, token) = cancel_pair();
        let mut sweep = collector.sweep(token).unwrap();
        assert!(sweep.events.recv().await.is_some());
        handle.cancel();
        let summary = sweep.finish().await.unwrap();
        assert!(summary.interrupted);
        let remaining = store.all_keys(&CancelToken::never()).unwrap().count() as u64;
        assert_eq!(remaining, 50 - summary.removed);
    }
}
