//! Shared fixtures for the operation tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use kiln_store::{
    BlockStore, Datastore, DatastoreBlockStore, InMemoryDatastore, KeyScan, StoreError,
    StoreResult,
};
use kiln_types::BlockKey;

/// In-memory datastore with switchable failures.
#[derive(Debug, Default)]
pub struct FlakyDatastore {
    inner: InMemoryDatastore,
    fail_delete: Mutex<HashSet<String>>,
    fail_scan: AtomicBool,
    break_scan_after: Mutex<Option<usize>>,
    fail_reads_of: Mutex<HashSet<String>>,
    io_threads: Mutex<HashSet<ThreadId>>,
}

impl FlakyDatastore {
    /// Deleting this block fails with [`StoreError::ReadOnly`].
    pub fn fail_delete_of(&self, key: &BlockKey) {
        self.fail_delete
            .lock()
            .unwrap()
            .insert(DatastoreBlockStore::block_path(key));
    }

    /// Every scan fails up front.
    pub fn fail_scans(&self) {
        self.fail_scan.store(true, Ordering::SeqCst);
    }

    /// Scans yield `n` keys, then one error.
    pub fn break_scans_after(&self, n: usize) {
        *self.break_scan_after.lock().unwrap() = Some(n);
    }

    /// Reads and existence checks of `key` fail.
    pub fn fail_reads_of(&self, key: &str) {
        self.fail_reads_of.lock().unwrap().insert(key.to_string());
    }

    /// Threads that have read, deleted or scanned.
    pub fn io_threads(&self) -> HashSet<ThreadId> {
        self.io_threads.lock().unwrap().clone()
    }

    fn record_thread(&self) {
        self.io_threads.lock().unwrap().insert(thread::current().id());
    }

    fn check_read(&self, key: &str) -> StoreResult<()> {
        self.record_thread();
        if self.fail_reads_of.lock().unwrap().contains(key) {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl Datastore for FlakyDatastore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_read(key)?;
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.inner.put(key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.record_thread();
        if self.fail_delete.lock().unwrap().contains(key) {
            return Err(StoreError::ReadOnly);
        }
        self.inner.delete(key)
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        self.check_read(key)?;
        self.inner.has(key)
    }

    fn scan<'a>(&'a self, prefix: &str) -> StoreResult<KeyScan<'a>> {
        self.record_thread();
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(StoreError::ReadOnly);
        }
        let scan = self.inner.scan(prefix)?;
        let limit = *self.break_scan_after.lock().unwrap();
        match limit {
            Some(n) => Ok(Box::new(
                scan.take(n).chain(std::iter::once(Err(StoreError::ReadOnly))),
            )),
            None => Ok(scan),
        }
    }

    fn disk_usage(&self) -> StoreResult<u64> {
        self.inner.disk_usage()
    }
}

/// A flaky datastore, a block store over it, and the keys written.
pub struct Fixture {
    pub ds: Arc<FlakyDatastore>,
    pub store: Arc<DatastoreBlockStore>,
    pub keys: Vec<BlockKey>,
}

impl Fixture {
    pub fn with_blocks(n: u8) -> Self {
        let ds = Arc::new(FlakyDatastore::default());
        let store = Arc::new(DatastoreBlockStore::new(ds.clone()));
        let keys = (0..n)
            .map(|i| store.put(&[b'b', i]).unwrap())
            .collect();
        Self { ds, store, keys }
    }

    /// Overwrite a block's payload so its content no longer matches its key.
    pub fn corrupt(&self, key: &BlockKey) {
        self.ds
            .put(&DatastoreBlockStore::block_path(key), b"bit rot")
            .unwrap();
    }
}
