//! Storage layer for Kiln.
//!
//! Three layers, bottom-up:
//!
//! - [`Datastore`] -- flat key-value store ([`InMemoryDatastore`],
//!   [`FsDatastore`]).
//! - [`BlockStore`] -- content-addressed blocks over a datastore, with an
//!   optional hash-on-read mode that recomputes every payload's key
//!   ([`DatastoreBlockStore`]).
//! - [`Repo`] -- an open repository: datastore plus configuration, version
//!   and location ([`FsRepo`], [`MemoryRepo`]).
//!
//! Long scans take a [`CancelToken`] and stop yielding once it fires.
//! Async callers run them through a [`BlockingFeed`] on Tokio's blocking
//! pool.
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written (content addressing guarantees this).
//! 2. Key enumeration is lazy and single-pass; callers must not rely on order.
//! 3. Only one process opens an on-disk repository at a time (`repo.lock`).
//! 4. All I/O errors are propagated, never silently ignored.

pub mod blocking;
pub mod blockstore;
pub mod cancel;
pub mod config;
pub mod datastore;
pub mod error;
pub mod fs;
pub mod repo;

pub use blocking::{BlockingFeed, FeedSender};
pub use blockstore::{BlockStore, DatastoreBlockStore, KeyIter};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::{parse_size, MaintenanceConfig, RepoConfig, NO_LIMIT};
pub use datastore::{
    Datastore, InMemoryDatastore, KeyScan, BLOCKS_PREFIX, FILES_ROOT_KEY, PINS_PREFIX,
};
pub use error::{StoreError, StoreResult};
pub use fs::FsDatastore;
pub use repo::{version_string, FsRepo, FsRepoOpener, MemoryRepo, OpenRepo, Repo, REPO_VERSION};
