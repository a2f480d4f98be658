use std::path::PathBuf;

use kiln_types::{BlockKey, TypeError};

/// Errors from datastore, block store and repository operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(BlockKey),

    /// Content hash mismatch on read (data corruption).
    #[error("hash mismatch for {key}: computed {computed}")]
    HashMismatch { key: BlockKey, computed: BlockKey },

    /// A datastore key could not be used or decoded.
    #[error("invalid datastore key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A stored value could not be decoded.
    #[error("invalid block key: {0}")]
    Type(#[from] TypeError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository configuration could not be read or written.
    #[error("configuration error: {0}")]
    Config(String),

    /// No repository exists at the given path.
    #[error("no repository found at {}", .0.display())]
    NotInitialized(PathBuf),

    /// A repository already exists at the given path.
    #[error("repository already exists at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    /// Another process holds the repository lock.
    #[error("repository at {} is locked by another process (is a daemon running?)", .0.display())]
    Locked(PathBuf),

    /// The on-disk format version is not the one this build understands.
    #[error("repository version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: String },

    /// Storage backend is read-only or otherwise refuses writes.
    #[error("store is read-only")]
    ReadOnly,

    /// A background scan task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
