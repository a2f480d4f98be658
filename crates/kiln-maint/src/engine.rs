use std::sync::Arc;

use kiln_gc::{Collector, DatastorePins, GcEvent, PinnedSetCollector};
use kiln_store::{BlockStore, CancelToken, DatastoreBlockStore, Repo};

use crate::error::{MaintError, MaintResult};
use crate::event::VerifyEvent;
use crate::gc::{self, GcPolicy};
use crate::observer::{Notice, Observer, TracingObserver};
use crate::stats::{self, RepoStat};
use crate::stream::OpStream;
use crate::verify;

/// Maintenance operations over one open repository.
///
/// Streaming operations must be started from within a Tokio runtime.
pub struct Maintenance {
    repo: Arc<dyn Repo>,
    collector: Arc<dyn Collector>,
    observer: Arc<dyn Observer>,
    event_buffer: usize,
}

impl Maintenance {
    /// Engine with the default collector: everything not pinned under
    /// `/pins/` (or named by the files root) is garbage.
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        let event_buffer = repo.config().maintenance.event_buffer.max(1);
        let ds = repo.datastore();
        let store = Arc::new(DatastoreBlockStore::new(Arc::clone(&ds)));
        let collector = PinnedSetCollector::new(store, Arc::new(DatastorePins::new(ds)))
            .with_capacity(event_buffer);
        Self::with_collector(repo, Arc::new(collector))
    }

    pub fn with_collector(repo: Arc<dyn Repo>, collector: Arc<dyn Collector>) -> Self {
        let event_buffer = repo.config().maintenance.event_buffer.max(1);
        Self {
            repo,
            collector,
            observer: Arc::new(TracingObserver),
            event_buffer,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the configured event queue capacity (minimum 1).
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn repo(&self) -> &Arc<dyn Repo> {
        &self.repo
    }

    /// Run garbage collection, reporting failures according to `policy`.
    pub fn run_gc(&self, policy: GcPolicy, cancel: CancelToken) -> OpStream<GcEvent> {
        gc::run_gc(
            Arc::clone(&self.collector),
            policy,
            cancel,
            self.event_buffer,
            Arc::clone(&self.observer),
        )
    }

    /// Re-hash every stored block and report the ones that do not match.
    pub fn verify_blocks(&self, cancel: CancelToken) -> OpStream<VerifyEvent> {
        let store = DatastoreBlockStore::new(self.repo.datastore()).with_hash_on_read(true);
        verify::verify_blocks(
            Arc::new(store),
            cancel,
            self.event_buffer,
            Arc::clone(&self.observer),
        )
    }

    /// Count blocks and gather size, limit, location and version.
    ///
    /// The count runs on the blocking pool.
    pub async fn compute_stats(&self, cancel: CancelToken) -> MaintResult<RepoStat> {
        let repo = Arc::clone(&self.repo);
        let stat = tokio::task::spawn_blocking(move || {
            let store = DatastoreBlockStore::new(repo.datastore());
            stats::compute_stats(repo.as_ref(), &store as &dyn BlockStore, &cancel)
        })
        .await
        .map_err(|e| MaintError::Internal(e.to_string()))??;
        self.observer.notice(Notice::StatsComputed {
            num_objects: stat.num_objects,
            repo_size: stat.repo_size,
        });
        Ok(stat)
    }

    /// The repository's on-disk format version, e.g. `fs-repo@1`.
    pub fn repo_version(&self) -> String {
        self.repo.version()
    }
}

impl std::fmt::Debug for Maintenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Maintenance")
            .field("repo", &self.repo.path())
            .field("event_buffer", &self.event_buffer)
            .finish_non_exhaustive()
    }
}
