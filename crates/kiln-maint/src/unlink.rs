//! Removal of the files-tree root entry.
//!
//! Only the reserved `/local/filesroot` entry is ever deleted here. Block
//! data, including the block the root points at, is left for the garbage
//! collector.

use std::sync::Arc;

use kiln_store::{
    BlockStore, CancelToken, DatastoreBlockStore, OpenRepo, Repo, FILES_ROOT_KEY,
};
use kiln_types::BlockKey;
use tracing::debug;

use crate::error::{MaintError, MaintResult};
use crate::observer::{Notice, Observer};

/// Message reported when there is no files root to unlink.
pub const ROOT_NOT_FOUND_MESSAGE: &str = "Files API root not found";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnlinkOptions {
    /// Required; without it nothing is opened or changed.
    pub confirm: bool,
    /// Acknowledge that the root block is stored locally.
    pub remove_local_root: bool,
}

/// Successful result of [`unlink_files_root`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnlinkOutcome {
    RootNotFound,
    Unlinked { root: String },
}

impl UnlinkOutcome {
    /// Human-readable message for the outcome.
    pub fn message(&self) -> String {
        match self {
            Self::RootNotFound => ROOT_NOT_FOUND_MESSAGE.to_string(),
            Self::Unlinked { root } => {
                format!("Unlinked files API root. Root hash was {root}")
            }
        }
    }
}

/// Delete the files root entry of the repository `opener` opens.
///
/// The repository is opened directly, so on-disk repositories fail to open
/// while another process holds them.
pub fn unlink_files_root<O: OpenRepo>(
    opener: &O,
    opts: UnlinkOptions,
    cancel: &CancelToken,
    observer: &dyn Observer,
) -> MaintResult<UnlinkOutcome> {
    if !opts.confirm {
        return Err(MaintError::ConfirmationRequired);
    }
    if cancel.is_cancelled() {
        return Err(MaintError::Cancelled);
    }

    let repo = opener.open()?;
    let result = unlink_in(&repo, opts, cancel, observer);
    let closed = repo.close();
    let outcome = result?;
    closed?;
    Ok(outcome)
}

fn unlink_in(
    repo: &dyn Repo,
    opts: UnlinkOptions,
    cancel: &CancelToken,
    observer: &dyn Observer,
) -> MaintResult<UnlinkOutcome> {
    let ds = repo.datastore();
    let Some(raw) = ds.get(FILES_ROOT_KEY)? else {
        observer.notice(Notice::RootNotFound);
        return Ok(UnlinkOutcome::RootNotFound);
    };

    let (root, have) = match BlockKey::cast(&raw) {
        Ok(key) => {
            let store = DatastoreBlockStore::new(Arc::clone(&ds));
            let root = key.to_string();
            let have = store
                .has(&key)
                .map_err(|source| MaintError::RootPresence {
                    root: root.clone(),
                    source,
                })?;
            (root, have)
        }
        Err(e) => {
            debug!(error = %e, "files root is not a block key");
            (bs58::encode(&raw).into_string(), false)
        }
    };

    if have && !opts.remove_local_root {
        return Err(MaintError::RootExistsLocally { root });
    }
    if !have && opts.remove_local_root {
        return Err(MaintError::RootNotLocal { root });
    }
    if cancel.is_cancelled() {
        return Err(MaintError::Cancelled);
    }

    ds.delete(FILES_ROOT_KEY)
        .map_err(|source| MaintError::RootDelete {
            root: root.clone(),
            source,
        })?;
    observer.notice(Notice::RootUnlinked { root: root.clone() });
    Ok(UnlinkOutcome::Unlinked { root })
}
