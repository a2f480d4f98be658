use kiln_store::StoreError;

/// Terminal errors of maintenance operations.
#[derive(Debug, thiserror::Error)]
pub enum MaintError {
    /// A destructive operation was invoked without confirmation.
    #[error("this is a potentially dangerous operation please pass --confirm to proceed")]
    ConfirmationRequired,

    /// A streamed GC run delivered at least one per-block failure.
    #[error("encountered errors during gc run")]
    GcErrors { failed: u64 },

    /// Verification found corrupt blocks.
    #[error("verify complete, some blocks were corrupt")]
    VerifyCorrupt { corrupt: u64 },

    /// The files root is retrievable locally and the caller did not opt in.
    #[error("root {root} exists locally. Are you sure you want to unlink this? Pass --remove-local-root to continue")]
    RootExistsLocally { root: String },

    /// The caller asked to remove a local root that is not stored locally.
    #[error("root {root} does not exist locally. Please remove --remove-local-root to continue")]
    RootNotLocal { root: String },

    /// Local presence of the files root could not be determined.
    #[error("unable to check whether root {root} exists locally: {source}")]
    RootPresence { root: String, source: StoreError },

    /// Deleting the files root entry failed.
    #[error("unable to remove API root: {source}. Root hash was {root}")]
    RootDelete { root: String, source: StoreError },

    /// A single-result operation was cancelled before it could produce one.
    #[error("operation cancelled")]
    Cancelled,

    /// Store, repository or sweep failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation task ended without reporting a status.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for maintenance operations.
pub type MaintResult<T> = Result<T, MaintError>;
