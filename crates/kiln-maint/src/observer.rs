//! Side-channel reporting for maintenance operations.
//!
//! The engine never logs directly; it hands [`Notice`]s to an injected
//! [`Observer`]. [`TracingObserver`] forwards them to `tracing`.

use std::sync::Mutex;

use kiln_types::BlockKey;
use tracing::{debug, error, info, warn};

/// Something worth reporting that happened during an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    GcStarted { streaming: bool },
    GcRemoved { key: BlockKey },
    GcFailed { key: BlockKey, cause: String },
    GcFinished { removed: u64, failed: u64 },
    VerifyStarted,
    BlockCorrupt { key: BlockKey, cause: String },
    VerifyFinished { scanned: u64, corrupt: u64 },
    /// The key sequence could not be obtained or broke mid-scan.
    EnumerationFailed { cause: String },
    RootNotFound,
    RootUnlinked { root: String },
    StatsComputed { num_objects: u64, repo_size: u64 },
    /// An operation stopped early because of cancellation.
    Interrupted { operation: &'static str, delivered: u64 },
}

/// Receives notices from maintenance operations.
pub trait Observer: Send + Sync {
    fn notice(&self, notice: Notice);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn notice(&self, _notice: Notice) {}
}

/// Logs notices through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notice(&self, notice: Notice) {
        match notice {
            Notice::GcStarted { streaming } => info!(streaming, "gc started"),
            Notice::GcRemoved { key } => debug!(key = %key, "removed block"),
            Notice::GcFailed { key, cause } => warn!(key = %key, %cause, "failed to remove block"),
            Notice::GcFinished { removed, failed } => info!(removed, failed, "gc finished"),
            Notice::VerifyStarted => info!("verify started"),
            Notice::BlockCorrupt { key, cause } => warn!(key = %key, %cause, "block was corrupt"),
            Notice::VerifyFinished { scanned, corrupt } => {
                info!(scanned, corrupt, "verify finished")
            }
            Notice::EnumerationFailed { cause } => error!(%cause, "key enumeration failed"),
            Notice::RootNotFound => info!("files API root not found"),
            Notice::RootUnlinked { root } => info!(%root, "unlinked files API root"),
            Notice::StatsComputed {
                num_objects,
                repo_size,
            } => debug!(num_objects, repo_size, "computed repo stats"),
            Notice::Interrupted {
                operation,
                delivered,
            } => info!(operation, delivered, "operation interrupted"),
        }
    }
}

/// Keeps every notice in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the notices received so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("lock poisoned").clone()
    }
}

impl Observer for RecordingObserver {
    fn notice(&self, notice: Notice) {
        self.notices.lock().expect("lock poisoned").push(notice);
    }
}
