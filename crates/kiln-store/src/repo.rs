//! Repository handles.
//!
//! A repository bundles a [`Datastore`] with its configuration, on-disk
//! format version and location. [`FsRepo`] is the on-disk layout:
//!
//! ```text
//! <root>/
//!   version        format version, a single integer
//!   config.toml    RepoConfig
//!   repo.lock      held while a process has the repository open
//!   datastore/     FsDatastore entries
//! ```
//!
//! [`MemoryRepo`] keeps everything in memory for tests and embedding.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{RepoConfig, CONFIG_FILE};
use crate::datastore::{Datastore, InMemoryDatastore};
use crate::error::{StoreError, StoreResult};
use crate::fs::FsDatastore;

/// On-disk format version understood by this build.
pub const REPO_VERSION: u32 = 1;

pub const LOCK_FILE: &str = "repo.lock";
pub const VERSION_FILE: &str = "version";
pub const DATASTORE_DIR: &str = "datastore";

/// Display form of a format version, e.g. `fs-repo@1`.
pub fn version_string(version: u32) -> String {
    format!("fs-repo@{version}")
}

/// An open repository.
pub trait Repo: Send + Sync {
    /// Where the repository lives (a path, or a label for non-disk repos).
    fn path(&self) -> String;

    /// The key-value store holding blocks, pins and the files root.
    fn datastore(&self) -> Arc<dyn Datastore>;

    fn config(&self) -> &RepoConfig;

    /// Display form of the on-disk format version.
    fn version(&self) -> String;

    /// Bytes currently used by the repository's data.
    fn storage_usage(&self) -> StoreResult<u64>;

    /// Release the repository. Dropping a handle also releases it.
    fn close(self) -> StoreResult<()>
    where
        Self: Sized;
}

/// Something that can open a repository on demand.
///
/// Operations that must bypass a running node (such as unlinking the files
/// root) take an opener instead of an already open handle.
pub trait OpenRepo {
    type Repo: Repo;

    fn open(&self) -> StoreResult<Self::Repo>;
}

// ---------------------------------------------------------------------------
// Filesystem repository
// ---------------------------------------------------------------------------

/// Repository stored in a directory, guarded by a lock file.
#[derive(Debug)]
pub struct FsRepo {
    root: PathBuf,
    config: RepoConfig,
    datastore: Arc<FsDatastore>,
    locked: bool,
}

impl FsRepo {
    /// Create a new repository at `root`.
    pub fn init(root: &Path, config: &RepoConfig) -> StoreResult<()> {
        if root.join(VERSION_FILE).exists() {
            return Err(StoreError::AlreadyInitialized(root.to_path_buf()));
        }
        fs::create_dir_all(root.join(DATASTORE_DIR))?;
        config.save(&root.join(CONFIG_FILE))?;
        fs::write(root.join(VERSION_FILE), format!("{REPO_VERSION}\n"))?;
        info!(root = %root.display(), "initialized repository");
        Ok(())
    }

    /// Returns `true` if a repository exists at `root`.
    pub fn is_initialized(root: &Path) -> bool {
        root.join(VERSION_FILE).is_file()
    }

    /// Open an existing repository, taking its lock.
    pub fn open(root: &Path) -> StoreResult<Self> {
        if !Self::is_initialized(root) {
            return Err(StoreError::NotInitialized(root.to_path_buf()));
        }
        let found = fs::read_to_string(root.join(VERSION_FILE))?;
        if found.trim() != REPO_VERSION.to_string() {
            return Err(StoreError::VersionMismatch {
                expected: REPO_VERSION,
                found: found.trim().to_string(),
            });
        }

        acquire_lock(root)?;
        let opened = Self::load(root);
        if opened.is_err() {
            release_lock(root);
        }
        opened
    }

    fn load(root: &Path) -> StoreResult<Self> {
        let config_path = root.join(CONFIG_FILE);
        let config = if config_path.exists() {
            RepoConfig::load(&config_path)?
        } else {
            RepoConfig::default()
        };
        let datastore = Arc::new(FsDatastore::open(&root.join(DATASTORE_DIR))?);
        debug!(root = %root.display(), "opened repository");
        Ok(Self {
            root: root.to_path_buf(),
            config,
            datastore,
            locked: true,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unlock(&mut self) -> StoreResult<()> {
        if self.locked {
            self.locked = false;
            match fs::remove_file(self.root.join(LOCK_FILE)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn acquire_lock(root: &Path) -> StoreResult<()> {
    let lock_path = root.join(LOCK_FILE);
    match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
        Ok(mut file) => {
            writeln!(file, "{}", std::process::id())?;
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(StoreError::Locked(root.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

fn release_lock(root: &Path) {
    if let Err(e) = fs::remove_file(root.join(LOCK_FILE)) {
        warn!(root = %root.display(), error = %e, "failed to remove repository lock");
    }
}

impl Repo for FsRepo {
    fn path(&self) -> String {
        self.root.display().to_string()
    }

    fn datastore(&self) -> Arc<dyn Datastore> {
        self.datastore.clone()
    }

    fn config(&self) -> &RepoConfig {
        &self.config
    }

    fn version(&self) -> String {
        version_string(REPO_VERSION)
    }

    fn storage_usage(&self) -> StoreResult<u64> {
        self.datastore.disk_usage()
    }

    fn close(mut self) -> StoreResult<()> {
        self.unlock()
    }
}

impl Drop for FsRepo {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            warn!(root = %self.root.display(), error = %e, "failed to release repository lock");
        }
    }
}

/// Opens an [`FsRepo`] at a fixed path.
#[derive(Clone, Debug)]
pub struct FsRepoOpener {
    root: PathBuf,
}

impl FsRepoOpener {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl OpenRepo for FsRepoOpener {
    type Repo = FsRepo;

    fn open(&self) -> StoreResult<FsRepo> {
        FsRepo::open(&self.root)
    }
}

// ---------------------------------------------------------------------------
// In-memory repository
// ---------------------------------------------------------------------------

/// Repository backed by any in-process datastore. Clones share state.
#[derive(Clone)]
pub struct MemoryRepo {
    datastore: Arc<dyn Datastore>,
    config: RepoConfig,
}

impl MemoryRepo {
    /// Empty repository over an [`InMemoryDatastore`].
    pub fn new() -> Self {
        Self::with_datastore(Arc::new(InMemoryDatastore::new()))
    }

    /// Repository over a caller-supplied datastore.
    pub fn with_datastore(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            config: RepoConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RepoConfig) -> Self {
        self.config = config;
        self
    }
}

impl Default for MemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl Repo for MemoryRepo {
    fn path(&self) -> String {
        "<memory>".into()
    }

    fn datastore(&self) -> Arc<dyn Datastore> {
        self.datastore.clone()
    }

    fn config(&self) -> &RepoConfig {
        &self.config
    }

    fn version(&self) -> String {
        version_string(REPO_VERSION)
    }

    fn storage_usage(&self) -> StoreResult<u64> {
        self.datastore.disk_usage()
    }

    fn close(self) -> StoreResult<()> {
        Ok(())
    }
}

impl OpenRepo for MemoryRepo {
    type Repo = MemoryRepo;

    fn open(&self) -> StoreResult<MemoryRepo> {
        Ok(self.clone())
    }
}

impl std::fmt::Debug for MemoryRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRepo")
            .field("config", &self.config)
            .finish()
    }
}
