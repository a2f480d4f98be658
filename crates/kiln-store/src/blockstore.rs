use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use kiln_types::{BlockHasher, BlockKey};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::datastore::{Datastore, BLOCKS_PREFIX};
use crate::error::{StoreError, StoreResult};

/// Lazy, single-pass, unordered sequence of block keys.
pub type KeyIter<'a> = Box<dyn Iterator<Item = StoreResult<BlockKey>> + Send + 'a>;

/// Content-addressed block store.
///
/// All implementations must satisfy these invariants:
/// - A block's key is the hash of its payload; `put` is idempotent.
/// - `get` on a missing key is an error ([`StoreError::NotFound`]), not `None`.
/// - With hash-on-read enabled, `get` recomputes the key of every payload
///   it returns and fails with [`StoreError::HashMismatch`] on disagreement.
/// - `all_keys` stops yielding once its cancel token fires.
pub trait BlockStore: Send + Sync {
    /// Check whether a block exists.
    fn has(&self, key: &BlockKey) -> StoreResult<bool>;

    /// Retrieve a block's payload.
    fn get(&self, key: &BlockKey) -> StoreResult<Bytes>;

    /// Store a payload and return its key.
    fn put(&self, data: &[u8]) -> StoreResult<BlockKey>;

    /// Delete a block. Deleting a missing block is [`StoreError::NotFound`].
    ///
    /// This is intended for garbage collection only.
    fn delete(&self, key: &BlockKey) -> StoreResult<()>;

    /// Enumerate every stored key.
    fn all_keys<'a>(&'a self, cancel: &CancelToken) -> StoreResult<KeyIter<'a>>;

    /// Toggle recomputation of content hashes on every `get`.
    fn set_hash_on_read(&self, enabled: bool);
}

/// Block store layered over any [`Datastore`], blocks under `/blocks/`.
pub struct DatastoreBlockStore {
    ds: Arc<dyn Datastore>,
    hash_on_read: AtomicBool,
}

impl DatastoreBlockStore {
    pub fn new(ds: Arc<dyn Datastore>) -> Self {
        Self {
            ds,
            hash_on_read: AtomicBool::new(false),
        }
    }

    /// Builder-style variant of [`BlockStore::set_hash_on_read`].
    pub fn with_hash_on_read(self, enabled: bool) -> Self {
        self.hash_on_read.store(enabled, Ordering::Relaxed);
        self
    }

    /// The datastore key for a block.
    pub fn block_path(key: &BlockKey) -> String {
        format!("{BLOCKS_PREFIX}{}", key.to_hex())
    }
}

impl BlockStore for DatastoreBlockStore {
    fn has(&self, key: &BlockKey) -> StoreResult<bool> {
        self.ds.has(&Self::block_path(key))
    }

    fn get(&self, key: &BlockKey) -> StoreResult<Bytes> {
        let data = self
            .ds
            .get(&Self::block_path(key))?
            .ok_or(StoreError::NotFound(*key))?;
        if self.hash_on_read.load(Ordering::Relaxed) && !BlockHasher::BLOCK.verify(&data, key) {
            return Err(StoreError::HashMismatch {
                key: *key,
                computed: BlockKey::for_data(&data),
            });
        }
        Ok(Bytes::from(data))
    }

    fn put(&self, data: &[u8]) -> StoreResult<BlockKey> {
        let key = BlockKey::for_data(data);
        let path = Self::block_path(&key);
        if !self.ds.has(&path)? {
            self.ds.put(&path, data)?;
        }
        Ok(key)
    }

    fn delete(&self, key: &BlockKey) -> StoreResult<()> {
        if self.ds.delete(&Self::block_path(key))? {
            debug!(key = %key.short_hex(), "deleted block");
            Ok(())
        } else {
            Err(StoreError::NotFound(*key))
        }
    }

    fn all_keys<'a>(&'a self, cancel: &CancelToken) -> StoreResult<KeyIter<'a>> {
        let cancel = cancel.clone();
        let scan = self.ds.scan(BLOCKS_PREFIX)?;
        let keys = scan
            .take_while(move |_| !cancel.is_cancelled())
            .filter_map(|entry| {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => return Some(Err(e)),
                };
                let hex = path.strip_prefix(BLOCKS_PREFIX).unwrap_or(&path);
                match BlockKey::from_hex(hex) {
                    Ok(key) => Some(Ok(key)),
                    Err(e) => {
                        warn!(path = %path, error = %e, "skipping malformed block key");
                        None
                    }
                }
            });
        Ok(Box::new(keys))
    }

    fn set_hash_on_read(&self, enabled: bool) {
        self.hash_on_read.store(enabled, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for DatastoreBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreBlockStore")
            .field("hash_on_read", &self.hash_on_read.load(Ordering::Relaxed))
            .finish()
    }
}
