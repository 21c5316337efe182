//! Status command implementation

use crate::config::Config;
use crate::embed::HttpEmbedder;
use crate::error::Result;
use crate::store::QdrantStore;
use crate::tracking::{FileStatus, TrackingStats, TrackingStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub blob_root: String,
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_model: String,
    /// Backend reachable and serving the configured model
    pub embedding_ready: bool,
    pub qdrant_connected: bool,
    pub collection_exists: bool,
    pub qdrant_points: u64,
    pub tracking: TrackingStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, store: &TrackingStore) -> Result<StatusInfo> {
    info!("Getting status");

    let tracking = store.statistics().await?;
    let (qdrant_connected, collection_exists, qdrant_points) = probe_qdrant(config).await;
    let embedding_ready = probe_embedder(config).await;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        blob_root: config.blob_root().display().to_string(),
        qdrant_url: config.qdrant.url.clone(),
        collection_name: config.qdrant.collection_name.clone(),
        embedding_model: config.embedding.model.clone(),
        embedding_ready,
        qdrant_connected,
        collection_exists,
        qdrant_points,
        tracking,
    })
}

async fn probe_qdrant(config: &Config) -> (bool, bool, u64) {
    let vectors = match QdrantStore::connect(config).await {
        Ok(v) => v,
        Err(e) => {
            debug!("Qdrant client error: {:?}", e);
            return (false, false, 0);
        }
    };

    match vectors.get_collection_info().await {
        Ok(Some(info)) => (true, true, info.points_count),
        Ok(None) => (true, false, 0),
        Err(e) => {
            debug!("Qdrant connection error: {:?}", e);
            (false, false, 0)
        }
    }
}

async fn probe_embedder(config: &Config) -> bool {
    let timeout = Duration::from_secs(config.processing.collaborator_timeout_secs);
    let result = match HttpEmbedder::new(&config.embedding, timeout) {
        Ok(embedder) => embedder.verify_model().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("Embedding backend check failed: {}", e);
            false
        }
    }
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 docflow Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Tracking database: {}", status.db_path);
    println!("Blob root: {}", status.blob_root);
    println!("\nQdrant:");
    println!("  URL: {}", status.qdrant_url);
    println!("  Collection: {}", status.collection_name);

    let connection_status = if status.qdrant_connected {
        if status.collection_exists {
            "✓ Connected"
        } else {
            "⚠ Connected (collection not created - run 'docflow db init')"
        }
    } else {
        "✗ Not connected"
    };
    println!("  Status: {}", connection_status);
    println!("  Points: {}", status.qdrant_points);
    println!(
        "\nEmbedding Model: {} ({})",
        status.embedding_model,
        if status.embedding_ready {
            "✓ ready"
        } else {
            "✗ backend unavailable"
        }
    );

    println!("\nFiles: {}", status.tracking.file_count());
    for file_status in FileStatus::ALL {
        let stats = status
            .tracking
            .files
            .get(&file_status)
            .cloned()
            .unwrap_or_default();
        println!(
            "  {:<10} {:>6}  ({} bytes)",
            file_status.as_str(),
            stats.count,
            stats.total_bytes
        );
    }

    let embeddings = &status.tracking.embeddings;
    println!(
        "\nEmbeddings: {} ({} indexed)",
        embeddings.total, embeddings.indexed
    );

    let batches = &status.tracking.batches;
    println!("Batches: {} ({} running)", batches.total, batches.running);
    println!(
        "  Files: {} successful, {} failed, {} skipped",
        batches.successful_files, batches.failed_files, batches.skipped_files
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::NewFile;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_without_qdrant() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        config.qdrant.url = "http://127.0.0.1:1".to_string();
        config.embedding.backend_url = "http://127.0.0.1:1".to_string();

        let store = TrackingStore::connect(&config).await.unwrap();
        store
            .create_pending(&NewFile {
                content_hash: "h1".to_string(),
                file_name: "a.pdf".to_string(),
                size_bytes: 10,
                source_path: "/inbox/a.pdf".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let status = cmd_status(&config, &store).await.unwrap();
        assert!(!status.qdrant_connected);
        assert!(!status.embedding_ready);
        assert_eq!(status.tracking.count(FileStatus::Pending), 1);
        assert!(status.blob_root.ends_with("blobs"));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["tracking"]["files"]["pending"]["count"], 1);
    }
}
