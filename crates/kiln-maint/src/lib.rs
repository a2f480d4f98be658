//! Repository maintenance for Kiln.
//!
//! Four operations over an open repository:
//!
//! - **gc** -- delete unpinned blocks, streaming a [`GcEvent`] per block.
//!   [`GcPolicy::Collect`] stops at the first failure;
//!   [`GcPolicy::StreamErrors`] reports every failure and keeps going.
//! - **verify** -- re-hash every block, streaming [`VerifyEvent`]s.
//! - **unlink root** -- drop the files-tree root entry
//!   ([`unlink_files_root`]), guarded by explicit confirmation.
//! - **stats** -- block count, size, limit, location and version
//!   ([`RepoStat`]).
//!
//! Streaming operations return an [`OpStream`]: events in production order,
//! then exactly one terminal status. Per-block failures are events;
//! anything that stops the operation is the terminal status. Cancellation
//! through a [`kiln_store::CancelToken`] ends a stream cleanly and leaves
//! committed deletions in place.

pub mod engine;
pub mod error;
pub mod event;
pub mod gc;
pub mod observer;
pub mod stats;
pub mod stream;
pub mod unlink;
pub mod verify;

#[cfg(test)]
mod testutil;

pub use engine::Maintenance;
pub use error::{MaintError, MaintResult};
pub use event::{GcEvent, VerifyEvent, VERIFY_CORRUPT_MESSAGE, VERIFY_OK_MESSAGE};
pub use gc::GcPolicy;
pub use observer::{Notice, NullObserver, Observer, RecordingObserver, TracingObserver};
pub use stats::RepoStat;
pub use stream::{Emitter, Interrupted, OpStream};
pub use unlink::{unlink_files_root, UnlinkOptions, UnlinkOutcome, ROOT_NOT_FOUND_MESSAGE};
