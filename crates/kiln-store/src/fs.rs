use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::datastore::{Datastore, KeyScan};
use crate::error::{StoreError, StoreResult};

/// Filesystem datastore: one file per key inside a single directory.
///
/// File names are the hex encoding of the key bytes, so any key maps to a
/// flat, portable name. Writes go through a temporary file in the same
/// directory and are renamed into place, so readers never see a torn value.
#[derive(Debug)]
pub struct FsDatastore {
    dir: PathBuf,
}

impl FsDatastore {
    /// Open (or create) a datastore directory.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        debug!(dir = %dir.display(), "opened filesystem datastore");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "empty key".into(),
            });
        }
        Ok(self.dir.join(hex::encode(key.as_bytes())))
    }
}

fn decode_entry_name(name: &str) -> Option<String> {
    let bytes = hex::decode(name).ok()?;
    String::from_utf8(bytes).ok()
}

impl Datastore for FsDatastore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.entry_path(key)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        match fs::remove_file(self.entry_path(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        match fs::metadata(self.entry_path(key)?) {
            Ok(meta) if meta.is_file() => Ok(true),
            Ok(_) => Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("datastore entry for {key:?} is not a regular file"),
            ))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn scan<'a>(&'a self, prefix: &str) -> StoreResult<KeyScan<'a>> {
        let entries = fs::read_dir(&self.dir)?;
        let prefix = prefix.to_string();
        let iter = entries.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(StoreError::Io(e))),
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // In-flight writes from `put`.
            if name.starts_with(".tmp") {
                return None;
            }
            match decode_entry_name(&name) {
                Some(key) if key.starts_with(&prefix) => Some(Ok(key)),
                Some(_) => None,
                None => {
                    warn!(entry = %name, "skipping undecodable datastore entry");
                    None
                }
            }
        });
        Ok(Box::new(iter))
    }

    fn disk_usage(&self) -> StoreResult<u64> {
        let mut total = 0u64;
        for entry in WalkDir::new(&self.dir) {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if entry.file_type().is_file() {
                total += entry.metadata().map_err(|e| StoreError::Io(e.into()))?.len();
            }
        }
        Ok(total)
    }
}
