use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StoreResult;

/// Prefix under which block payloads are stored.
pub const BLOCKS_PREFIX: &str = "/blocks/";
/// Prefix under which pin markers are stored.
pub const PINS_PREFIX: &str = "/pins/";
/// Reserved key holding the root of the files tree.
pub const FILES_ROOT_KEY: &str = "/local/filesroot";

/// Lazy, single-pass sequence of datastore keys.
pub type KeyScan<'a> = Box<dyn Iterator<Item = StoreResult<String>> + Send + 'a>;

/// Flat key-value store underneath the block store.
///
/// Keys are `/`-separated paths. Implementations must be thread-safe and
/// must propagate every backend error.
pub trait Datastore: Send + Sync {
    /// Read a value. Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Create or overwrite a value.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete a key. Returns `true` if the key existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Check whether a key exists.
    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Enumerate keys starting with `prefix`, in no particular order.
    fn scan<'a>(&'a self, prefix: &str) -> StoreResult<KeyScan<'a>>;

    /// Bytes held by stored values.
    fn disk_usage(&self) -> StoreResult<u64>;
}

/// In-memory, `BTreeMap`-based datastore for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryDatastore {
    /// Create a new empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the datastore is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }
}

impl Datastore for InMemoryDatastore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.entries.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    fn scan<'a>(&'a self, prefix: &str) -> StoreResult<KeyScan<'a>> {
        // Snapshot the matching keys so callers may delete while iterating.
        let map = self.entries.read().expect("lock poisoned");
        let keys: Vec<String> = map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn disk_usage(&self) -> StoreResult<u64> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.values().map(|v| v.len() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let ds = InMemoryDatastore::new();
        assert!(ds.get("/a").unwrap().is_none());
        ds.put("/a", b"one").unwrap();
        assert_eq!(ds.get("/a").unwrap().as_deref(), Some(&b"one"[..]));
        assert!(ds.has("/a").unwrap());
        assert!(ds.delete("/a").unwrap());
        assert!(!ds.delete("/a").unwrap());
        assert!(ds.is_empty());
    }

    #[test]
    fn put_overwrites() {
        let ds = InMemoryDatastore::new();
        ds.put(FILES_ROOT_KEY, b"old").unwrap();
        ds.put(FILES_ROOT_KEY, b"new").unwrap();
        assert_eq!(ds.get(FILES_ROOT_KEY).unwrap().unwrap(), b"new");
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn scan_filters_by_prefix() {
        let ds = InMemoryDatastore::new();
        ds.put("/blocks/aa", b"1").unwrap();
        ds.put("/blocks/bb", b"2").unwrap();
        ds.put("/pins/aa", b"").unwrap();
        ds.put(FILES_ROOT_KEY, b"r").unwrap();

        let mut blocks: Vec<String> = ds
            .scan(BLOCKS_PREFIX)
            .unwrap()
            .collect::<StoreResult<_>>()
            .unwrap();
        blocks.sort();
        assert_eq!(blocks, vec!["/blocks/aa", "/blocks/bb"]);

        let pins: Vec<String> = ds.scan(PINS_PREFIX).unwrap().map(|k| k.unwrap()).collect();
        assert_eq!(pins, vec!["/pins/aa"]);
    }

    #[test]
    fn scan_tolerates_deletes_during_iteration() {
        let ds = InMemoryDatastore::new();
        ds.put("/blocks/aa", b"1").unwrap();
        ds.put("/blocks/bb", b"2").unwrap();
        let mut seen = 0;
        for key in ds.scan(BLOCKS_PREFIX).unwrap() {
            ds.delete(&key.unwrap()).unwrap();
            seen += 1;
        }
        assert_eq!(seen, 2);
        assert!(ds.is_empty());
    }

    #[test]
    fn disk_usage_sums_values() {
        let ds = InMemoryDatastore::new();
        ds.put("/a", b"12345").unwrap();
        ds.put("/b", b"123456789").unwrap();
        assert_eq!(ds.disk_usage().unwrap(), 14);
    }
}
