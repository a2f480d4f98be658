use kiln_store::StoreError;
use kiln_types::BlockKey;

/// Outcome for one block visited by a sweep.
#[derive(Debug)]
pub enum GcEvent {
    /// The block was deleted.
    Removed { key: BlockKey },
    /// Deleting the block failed; the block may still be present.
    Failed { key: BlockKey, cause: StoreError },
}

impl GcEvent {
    /// The block this event is about.
    pub fn key(&self) -> &BlockKey {
        match self {
            Self::Removed { key } | Self::Failed { key, .. } => key,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
