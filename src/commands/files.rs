//! File and batch listing commands

use crate::error::{Error, Result};
use crate::store::QdrantStore;
use crate::tracking::{BatchRecord, EmbeddingRecord, FileRecord, FileStatus, TrackingStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One tracked file with its page embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDetails {
    pub file: FileRecord,
    pub embeddings: Vec<EmbeddingRecord>,
    /// Points found in the vector index, when it was reachable
    pub indexed_points: Option<u64>,
}

/// List tracked files, newest first, optionally in one status
pub async fn cmd_list_files(
    store: &TrackingStore,
    status: Option<FileStatus>,
    limit: usize,
) -> Result<Vec<FileRecord>> {
    match status {
        Some(status) => store.list_by_status(status, Some(limit)).await,
        None => store.list_recent(limit).await,
    }
}

/// Look a file up by file id, then by content hash
pub async fn cmd_show_file(
    store: &TrackingStore,
    vectors: Option<&QdrantStore>,
    key: &str,
) -> Result<FileDetails> {
    let file = match store.get_file(key).await? {
        Some(file) => file,
        None => store
            .lookup_by_hash(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No tracked file matches {}", key)))?,
    };

    let embeddings = store.list_embeddings(&file.file_id).await?;

    let indexed_points = match vectors {
        Some(vectors) => match vectors.count_file_points(&file.file_id).await {
            Ok(count) => Some(count),
            Err(e) => {
                debug!("Could not count points for {}: {}", file.file_id, e);
                None
            }
        },
        None => None,
    };

    Ok(FileDetails {
        file,
        embeddings,
        indexed_points,
    })
}

pub async fn cmd_list_batches(store: &TrackingStore, limit: usize) -> Result<Vec<BatchRecord>> {
    store.list_batches(limit).await
}

/// Print files list to console
pub fn print_files(files: &[FileRecord]) {
    println!("\n📄 Tracked Files\n");

    if files.is_empty() {
        println!("No files tracked. Use 'docflow run' to process a directory.");
        return;
    }

    for file in files {
        println!("• {} [{}]", file.file_name, file.status);
        println!("  ID: {}", file.file_id);
        println!("  Hash: {}", file.content_hash);
        println!("  Source: {}", file.source_path);
        if file.retry_count > 0 {
            println!("  Retries: {}", file.retry_count);
        }
        if let Some(err) = &file.error_message {
            println!("  Error: {}", err);
        }
        println!();
    }
}

pub fn print_file_details(details: &FileDetails) {
    let file = &details.file;
    println!("\n{} [{}]\n", file.file_name, file.status);
    println!("ID: {}", file.file_id);
    println!("Hash: {}", file.content_hash);
    println!("Size: {} bytes", file.size_bytes);
    println!("Type: {}", file.file_type.as_deref().unwrap_or("-"));
    println!("Source: {}", file.source_path);
    println!("Blob: {}", file.blob_url.as_deref().unwrap_or("-"));
    println!("Retries: {}", file.retry_count);
    if let Some(err) = &file.error_message {
        println!("Error: {}", err);
    }

    println!("\nTimeline:");
    println!("  created     {}", file.created_at);
    let stamps = [
        ("uploaded", &file.uploaded_at),
        ("processing", &file.processing_at),
        ("embedded", &file.embedded_at),
        ("failed", &file.failed_at),
    ];
    for (label, stamp) in stamps {
        if let Some(at) = stamp {
            println!("  {:<11} {}", label, at);
        }
    }

    println!("\nPages indexed: {}", details.embeddings.len());
    for embedding in &details.embeddings {
        println!(
            "  page {:>4}  {}  dim={} tokens={}",
            embedding.page_number,
            embedding.vector_id,
            embedding.embedding_dimension,
            embedding.token_count
        );
    }
    if let Some(points) = details.indexed_points {
        println!("Points in index: {}", points);
    }
}

pub fn print_batches(batches: &[BatchRecord]) {
    println!("\n📦 Batches\n");

    if batches.is_empty() {
        println!("No batches recorded.");
        return;
    }

    for batch in batches {
        println!("• {} [{}]", batch.batch_id, batch.status);
        println!(
            "  Started: {}  Ended: {}",
            batch.started_at,
            batch.ended_at.as_deref().unwrap_or("-")
        );
        println!(
            "  Files: {} total, {} successful, {} failed, {} skipped",
            batch.total_files, batch.successful_files, batch.failed_files, batch.skipped_files
        );
        if let Some(summary) = &batch.error_summary {
            println!("  Errors: {}", summary);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::TestHarness;
    use crate::pipeline::BatchOptions;

    #[tokio::test]
    async fn test_show_by_id_or_hash() {
        let h = TestHarness::new().await;
        let (record, mut work) = h.pending_record("a.pdf", b"doc a", 2).await;
        h.runner.run_to_completion(record.clone(), &mut work).await.unwrap();

        let by_id = cmd_show_file(&h.store, None, &record.file_id).await.unwrap();
        assert_eq!(by_id.embeddings.len(), 2);
        assert!(by_id.indexed_points.is_none());

        let by_hash = cmd_show_file(&h.store, None, &record.content_hash)
            .await
            .unwrap();
        assert_eq!(by_hash.file.file_id, record.file_id);

        let err = cmd_show_file(&h.store, None, "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_files_by_status() {
        let h = TestHarness::new().await;
        let (done, mut work) = h.pending_record("a.pdf", b"doc a", 1).await;
        h.runner.run_to_completion(done, &mut work).await.unwrap();
        h.pending_record("b.pdf", b"doc b", 1).await;

        assert_eq!(cmd_list_files(&h.store, None, 10).await.unwrap().len(), 2);
        let pending = cmd_list_files(&h.store, Some(FileStatus::Pending), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_name, "b.pdf");
    }

    #[tokio::test]
    async fn test_list_batches() {
        let h = TestHarness::new().await;
        h.coordinator()
            .run(Vec::new(), &BatchOptions::default())
            .await
            .unwrap();
        let batches = cmd_list_batches(&h.store, 5).await.unwrap();
        assert_eq!(batches.len(), 1);
    }
}
