use kiln_store::{BlockStore, CancelToken, Repo, NO_LIMIT};
use serde::Serialize;

use crate::error::{MaintError, MaintResult};

/// Point-in-time repository statistics.
///
/// Fields are read one after another, so concurrent writes may make them
/// disagree slightly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepoStat {
    pub num_objects: u64,
    pub repo_size: u64,
    /// Configured limit in bytes, or [`NO_LIMIT`].
    pub storage_max: u64,
    pub repo_path: String,
    pub version: String,
}

impl RepoStat {
    pub fn has_storage_limit(&self) -> bool {
        self.storage_max != NO_LIMIT
    }
}

/// Collect statistics for `repo`, counting blocks through `store`.
///
/// Cancellation during the count yields [`MaintError::Cancelled`]; a partial
/// count is never returned.
pub fn compute_stats(
    repo: &dyn Repo,
    store: &dyn BlockStore,
    cancel: &CancelToken,
) -> MaintResult<RepoStat> {
    let mut num_objects = 0u64;
    for key in store.all_keys(cancel)? {
        key?;
        num_objects += 1;
    }
    if cancel.is_cancelled() {
        return Err(MaintError::Cancelled);
    }

    Ok(RepoStat {
        num_objects,
        repo_size: repo.storage_usage()?,
        storage_max: repo.config().storage_max_bytes()?,
        repo_path: repo.path(),
        version: repo.version(),
    })
}
