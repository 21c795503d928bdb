//! Orphan cleanup

use stash_core::BlobId;
use stash_storage::{BlobStore, Result, Storage};
use tracing::warn;

/// Delete every blob on disk that no box or item references. Meant for
/// startup, before any edit session can hold unsaved blobs. Returns the ids
/// that were deleted.
pub async fn reconcile_orphans(storage: &Storage, store: &BlobStore) -> Result<Vec<BlobId>> {
    let in_use = storage.current_blob_ids_in_use().await?;
    let mut orphans: Vec<BlobId> = store
        .list_existing_ids()
        .await?
        .into_iter()
        .filter(|id| !in_use.contains(id))
        .collect();
    orphans.sort();

    if !orphans.is_empty() {
        warn!(count = orphans.len(), "Deleting orphan images");
        store.delete(orphans.clone()).await;
    }
    Ok(orphans)
}
