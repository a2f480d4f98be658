use std::collections::HashSet;
use std::sync::Arc;

use kiln_store::{Datastore, StoreResult, FILES_ROOT_KEY, PINS_PREFIX};
use kiln_types::BlockKey;
use tracing::warn;

/// Supplies the set of blocks a sweep must keep.
pub trait PinSource: Send + Sync {
    /// Snapshot of pinned keys, taken once at the start of a sweep.
    fn pinned(&self) -> StoreResult<HashSet<BlockKey>>;
}

/// Fixed pin set, mainly for tests.
#[derive(Clone, Debug, Default)]
pub struct StaticPins(pub HashSet<BlockKey>);

impl StaticPins {
    pub fn new(keys: impl IntoIterator<Item = BlockKey>) -> Self {
        Self(keys.into_iter().collect())
    }
}

impl PinSource for StaticPins {
    fn pinned(&self) -> StoreResult<HashSet<BlockKey>> {
        Ok(self.0.clone())
    }
}

/// Pins recorded in the datastore under `/pins/<hex>`.
///
/// The files root, when it holds a valid block key, is pinned as well:
/// blocks it references stay alive until the root is unlinked.
pub struct DatastorePins {
    ds: Arc<dyn Datastore>,
}

impl DatastorePins {
    pub fn new(ds: Arc<dyn Datastore>) -> Self {
        Self { ds }
    }

    fn pin_path(key: &BlockKey) -> String {
        format!("{PINS_PREFIX}{}", key.to_hex())
    }

    /// Record a pin.
    pub fn pin(&self, key: &BlockKey) -> StoreResult<()> {
        self.ds.put(&Self::pin_path(key), &[])
    }

    /// Remove a pin. Returns `true` if it existed.
    pub fn unpin(&self, key: &BlockKey) -> StoreResult<bool> {
        self.ds.delete(&Self::pin_path(key))
    }
}

impl PinSource for DatastorePins {
    fn pinned(&self) -> StoreResult<HashSet<BlockKey>> {
        let mut pins = HashSet::new();
        for path in self.ds.scan(PINS_PREFIX)? {
            let path = path?;
            let hex = path.strip_prefix(PINS_PREFIX).unwrap_or(&path);
            match BlockKey::from_hex(hex) {
                Ok(key) => {
                    pins.insert(key);
                }
                Err(e) => warn!(path = %path, error = %e, "ignoring malformed pin"),
            }
        }
        if let Some(raw) = self.ds.get(FILES_ROOT_KEY)? {
            if let Ok(root) = BlockKey::cast(&raw) {
                pins.insert(root);
            }
        }
        Ok(pins)
    }
}

impl std::fmt::Debug for DatastorePins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastorePins").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_store::InMemoryDatastore;

    #[test]
    fn pin_and_unpin() {
        let pins = DatastorePins::new(Arc::new(InMemoryDatastore::new()));
        let key = BlockKey::for_data(b"keep");
        pins.pin(&key).unwrap();
        assert!(pins.pinned().unwrap().contains(&key));
        assert!(pins.unpin(&key).unwrap());
        assert!(pins.pinned().unwrap().is_empty());
    }

    #[test]
    fn files_root_counts_as_pin() {
        let ds = Arc::new(InMemoryDatastore::new());
        let root = BlockKey::for_data(b"root");
        ds.put(FILES_ROOT_KEY, &root.to_bytes()).unwrap();
        let pins = DatastorePins::new(ds);
        assert_eq!(pins.pinned().unwrap(), HashSet::from([root]));
    }

    #[test]
    fn legacy_files_root_is_not_a_pin() {
        let ds = Arc::new(InMemoryDatastore::new());
        ds.put(FILES_ROOT_KEY, b"legacy-bytes").unwrap();
        ds.put("/pins/zz", b"").unwrap();
        let pins = DatastorePins::new(ds);
        assert!(pins.pinned().unwrap().is_empty());
    }

    #[test]
    fn static_pins() {
        let key = BlockKey::for_data(b"a");
        assert!(StaticPins::new([key]).pinned().unwrap().contains(&key));
    }
}
