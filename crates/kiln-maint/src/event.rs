use kiln_store::StoreError;
use kiln_types::BlockKey;

pub use kiln_gc::GcEvent;

/// Summary message when verification found nothing wrong.
pub const VERIFY_OK_MESSAGE: &str = "verify complete, all blocks validated";
/// Summary message when verification found corrupt blocks.
pub const VERIFY_CORRUPT_MESSAGE: &str = "verify complete, some blocks were corrupt";

/// Output of a block verification scan.
#[derive(Debug)]
pub enum VerifyEvent {
    /// The block could not be retrieved intact.
    Corrupt { key: BlockKey, cause: StoreError },
    /// Blocks scanned so far, corrupt ones included.
    Progress { count: u64 },
    /// Final message, emitted once after the key sequence is exhausted.
    Summary { message: String },
}

impl VerifyEvent {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}
