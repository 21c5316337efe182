//! Remove and reset commands implementation

use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::store::VectorStore;
use crate::tracking::{FileStatus, TrackingStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What `remove` deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveReport {
    pub file_id: String,
    pub file_name: String,
    pub embeddings_removed: usize,
    pub blob_deleted: bool,
}

/// Remove a file's vectors, its blob (unless `keep_blob`) and its record.
///
/// The record goes last, so a failed removal can be repeated.
pub async fn cmd_remove_file(
    store: &TrackingStore,
    blobs: &dyn BlobStore,
    vectors: &dyn VectorStore,
    file_id: &str,
    keep_blob: bool,
) -> Result<RemoveReport> {
    let record = store
        .get_file(file_id)
        .await?
        .ok_or_else(|| Error::UnknownFile(file_id.to_string()))?;

    let embeddings = store.list_embeddings(file_id).await?;
    vectors.delete_by_file_id(file_id).await?;

    let blob_deleted = match (&record.blob_name, keep_blob) {
        (Some(name), false) => {
            blobs.delete(name).await?;
            true
        }
        _ => false,
    };

    if !store.delete_file(file_id).await? {
        warn!(file_id = %file_id, "Record vanished during removal");
    }

    info!(file_id = %file_id, "Removed {}", record.file_name);

    Ok(RemoveReport {
        file_id: record.file_id,
        file_name: record.file_name,
        embeddings_removed: embeddings.len(),
        blob_deleted,
    })
}

/// Revert records stuck in `processing`
pub async fn cmd_reset_stuck(store: &TrackingStore) -> Result<u64> {
    store.reset_stuck(FileStatus::Processing).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::TestHarness;

    #[tokio::test]
    async fn test_remove_clears_everything() {
        let h = TestHarness::new().await;
        let (record, mut work) = h.pending_record("a.pdf", b"doc a", 2).await;
        h.runner.run_to_completion(record.clone(), &mut work).await.unwrap();
        assert_eq!(h.blobs.len(), 1);

        let report = cmd_remove_file(
            &h.store,
            h.blobs.as_ref(),
            h.vectors.as_ref(),
            &record.file_id,
            false,
        )
        .await
        .unwrap();

        assert_eq!(report.embeddings_removed, 2);
        assert!(report.blob_deleted);
        assert_eq!(h.blobs.len(), 0);
        assert_eq!(h.vectors.point_count(&record.file_id), 0);
        assert!(h.store.get_file(&record.file_id).await.unwrap().is_none());
        assert!(h.store.list_embeddings(&record.file_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_keep_blob() {
        let h = TestHarness::new().await;
        let (record, mut work) = h.pending_record("a.pdf", b"doc a", 1).await;
        h.runner.run_to_completion(record.clone(), &mut work).await.unwrap();

        let report = cmd_remove_file(
            &h.store,
            h.blobs.as_ref(),
            h.vectors.as_ref(),
            &record.file_id,
            true,
        )
        .await
        .unwrap();
        assert!(!report.blob_deleted);
        assert_eq!(h.blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown() {
        let h = TestHarness::new().await;
        let err = cmd_remove_file(
            &h.store,
            h.blobs.as_ref(),
            h.vectors.as_ref(),
            "missing",
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::UnknownFile(_)));
    }

    #[tokio::test]
    async fn test_reset_stuck() {
        let h = TestHarness::new().await;
        let (record, mut work) = h.pending_record("a.pdf", b"doc a", 1).await;
        let uploaded = h.runner.run_stage(&record, &mut work).await.unwrap();
        h.runner.run_stage(&uploaded, &mut work).await.unwrap();

        assert_eq!(cmd_reset_stuck(&h.store).await.unwrap(), 1);
        assert_eq!(cmd_reset_stuck(&h.store).await.unwrap(), 0);
    }
}
