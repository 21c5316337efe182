//! Durable file tracking using SQLite
//!
//! The tracking store is the single source of truth for where every document
//! is in the pipeline:
//! - Files (one per content fingerprint, with lifecycle status)
//! - Embeddings (one per indexed page)
//! - Batches (run history and aggregate outcomes)
//!
//! Status changes are compare-and-swap updates guarded by the expected prior
//! status, so two workers racing on one record cannot both win.

mod models;
mod schema;

pub use models::*;
pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fields of a page embedding that has been written to the vector store
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub page_number: i32,
    pub vector_id: String,
    pub embedding_dimension: i32,
    pub token_count: i32,
    pub indexed: bool,
}

/// Tracking database handle
#[derive(Clone)]
pub struct TrackingStore {
    pool: SqlitePool,
    max_retries: i32,
}

impl TrackingStore {
    /// Connect to the tracking database named by the config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file, config.tracking.max_retries).await
    }

    /// Open a database file directly, creating it and its schema if needed
    pub async fn open(db_path: &Path, max_retries: i32) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool, max_retries };

        if !store.is_initialized().await? {
            store.init_schema().await?;
        }

        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing tracking schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if the database has been initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='files'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    /// Retry ceiling applied when a failed record is sent back to pending
    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    // ===== File Operations =====

    /// Find the record for a content fingerprint
    pub async fn lookup_by_hash(&self, content_hash: &str) -> Result<Option<FileRecord>> {
        let record =
            sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE content_hash = ?")
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    /// Get a file record by id
    pub async fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Insert a new record in `pending`.
    ///
    /// Fails with [`Error::DuplicateKey`] when the fingerprint is already
    /// tracked, including when another worker inserted it first.
    pub async fn create_pending(&self, file: &NewFile) -> Result<FileRecord> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO files (
                file_id, content_hash, file_name, size_bytes, file_type, source_path,
                source_modified_at, status, retry_count, metadata_json, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&file.content_hash)
        .bind(&file.file_name)
        .bind(file.size_bytes)
        .bind(&file.file_type)
        .bind(&file.source_path)
        .bind(&file.source_modified_at)
        .bind(&file.metadata_json)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => {
                debug!("Tracking {} as {}", record.file_name, record.file_id);
                Ok(record)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::DuplicateKey(file.content_hash.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move a record along one edge of the lifecycle.
    ///
    /// The update only applies if the record is still in the status it was
    /// read in. `failed -> pending` is routed through [`Self::retry`] with the
    /// store's retry ceiling.
    pub async fn transition(
        &self,
        file_id: &str,
        to: FileStatus,
        fields: TransitionFields,
    ) -> Result<FileRecord> {
        let current = self
            .get_file(file_id)
            .await?
            .ok_or_else(|| Error::UnknownFile(file_id.to_string()))?;
        let from = current.status;

        if from == FileStatus::Failed && to == FileStatus::Pending {
            return self.retry(file_id, self.max_retries).await;
        }

        let stamp_column = match to.timestamp_column() {
            Some(column) if from.can_transition_to(to) => column,
            _ => {
                return Err(Error::InvalidTransition {
                    file_id: file_id.to_string(),
                    from,
                    to,
                })
            }
        };

        let error_message = match to {
            FileStatus::Failed => Some(
                fields
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            _ => None,
        };
        let clear_error = to == FileStatus::Embedded;
        let now = Utc::now().to_rfc3339();

        let sql = format!(
            r#"
            UPDATE files SET
                status = ?,
                updated_at = ?,
                {stamp_column} = ?,
                blob_url = COALESCE(?, blob_url),
                blob_name = COALESCE(?, blob_name),
                error_message = CASE WHEN ? THEN NULL ELSE COALESCE(?, error_message) END
            WHERE file_id = ? AND status = ?
            RETURNING *
            "#
        );

        let updated = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(to.as_str())
            .bind(&now)
            .bind(&now)
            .bind(fields.blob_url)
            .bind(fields.blob_name)
            .bind(clear_error)
            .bind(error_message)
            .bind(file_id)
            .bind(from.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(record) => {
                debug!("File {}: {} -> {}", file_id, from, to);
                Ok(record)
            }
            // Lost the race: report what the winner left behind
            None => match self.get_file(file_id).await? {
                Some(record) => Err(Error::InvalidTransition {
                    file_id: file_id.to_string(),
                    from: record.status,
                    to,
                }),
                None => Err(Error::UnknownFile(file_id.to_string())),
            },
        }
    }

    /// Send a failed record back to `pending`, bumping its retry count.
    ///
    /// Refused once `retry_count` has reached `max_retries`.
    pub async fn retry(&self, file_id: &str, max_retries: i32) -> Result<FileRecord> {
        let updated = sqlx::query_as::<_, FileRecord>(
            r#"
            UPDATE files SET
                status = 'pending',
                retry_count = retry_count + 1,
                updated_at = ?
            WHERE file_id = ? AND status = 'failed' AND retry_count < ?
            RETURNING *
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(file_id)
        .bind(max_retries)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = updated {
            info!(
                "Retrying file {} (attempt {}/{})",
                file_id, record.retry_count, max_retries
            );
            return Ok(record);
        }

        match self.get_file(file_id).await? {
            None => Err(Error::UnknownFile(file_id.to_string())),
            Some(record) if record.status != FileStatus::Failed => Err(Error::InvalidTransition {
                file_id: file_id.to_string(),
                from: record.status,
                to: FileStatus::Pending,
            }),
            Some(record) => Err(Error::RetryLimitExceeded {
                file_id: file_id.to_string(),
                retry_count: record.retry_count,
                max_retries,
            }),
        }
    }

    /// List records in a status, oldest first
    pub async fn list_by_status(
        &self,
        status: FileStatus,
        limit: Option<usize>,
    ) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM files WHERE status = ? ORDER BY created_at ASC, rowid ASC LIMIT ?",
        )
        .bind(status.as_str())
        .bind(limit.map(|l| l as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// List the most recently updated records across all statuses
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM files ORDER BY updated_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Revert records left in a transient status by an interrupted run.
    ///
    /// `processing` goes back to `uploaded` when the blob pointer survived and
    /// to `pending` otherwise. Every other status is already resumable as-is.
    pub async fn reset_stuck(&self, status: FileStatus) -> Result<u64> {
        if status != FileStatus::Processing {
            debug!("Nothing to reset for status {}", status);
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE files SET
                status = CASE WHEN blob_url IS NOT NULL THEN 'uploaded' ELSE 'pending' END,
                updated_at = ?
            WHERE status = 'processing'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            warn!("Reset {} file(s) stuck in processing", reset);
        }
        Ok(reset)
    }

    /// Delete a record; its embeddings cascade
    pub async fn delete_file(&self, file_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ===== Embedding Operations =====

    /// Record one indexed page of a file
    pub async fn record_embedding(
        &self,
        file_id: &str,
        embedding: &NewEmbedding,
    ) -> Result<EmbeddingRecord> {
        if embedding.page_number < 1 {
            return Err(Error::InvalidPage {
                file_id: file_id.to_string(),
                page: embedding.page_number,
            });
        }

        let result = sqlx::query_as::<_, EmbeddingRecord>(
            r#"
            INSERT INTO embeddings (
                embedding_id, file_id, page_number, vector_id,
                embedding_dimension, token_count, indexed, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(file_id)
        .bind(embedding.page_number)
        .bind(&embedding.vector_id)
        .bind(embedding.embedding_dimension)
        .bind(embedding.token_count)
        .bind(embedding.indexed)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::DuplicatePage {
                    file_id: file_id.to_string(),
                    page: embedding.page_number,
                })
            }
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                Err(Error::UnknownFile(file_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List the embeddings of a file by page
    pub async fn list_embeddings(&self, file_id: &str) -> Result<Vec<EmbeddingRecord>> {
        let records = sqlx::query_as::<_, EmbeddingRecord>(
            "SELECT * FROM embeddings WHERE file_id = ? ORDER BY page_number",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    // ===== Batch Operations =====

    /// Open a batch record in `running`
    pub async fn start_batch(&self, total_files: i64) -> Result<BatchRecord> {
        let batch = sqlx::query_as::<_, BatchRecord>(
            r#"
            INSERT INTO batches (batch_id, started_at, total_files, status)
            VALUES (?, ?, ?, 'running')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(total_files)
        .fetch_one(&self.pool)
        .await?;

        info!("Started batch {} ({} files)", batch.batch_id, total_files);
        Ok(batch)
    }

    /// Commit running aggregates. Counters never move backwards.
    pub async fn update_batch_progress(&self, batch_id: &str, counts: BatchCounts) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE batches SET
                successful_files = ?,
                failed_files = ?,
                skipped_files = ?
            WHERE batch_id = ?
                AND ended_at IS NULL
                AND successful_files <= ?
                AND failed_files <= ?
                AND skipped_files <= ?
            "#,
        )
        .bind(counts.successful)
        .bind(counts.failed)
        .bind(counts.skipped)
        .bind(batch_id)
        .bind(counts.successful)
        .bind(counts.failed)
        .bind(counts.skipped)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get_batch(batch_id).await? {
            None => Err(Error::UnknownBatch(batch_id.to_string())),
            Some(batch) if batch.ended_at.is_some() => {
                Err(Error::BatchClosed(batch_id.to_string()))
            }
            Some(_) => Err(Error::BatchRegression(batch_id.to_string())),
        }
    }

    /// Close a batch with its final status and aggregates
    pub async fn finish_batch(
        &self,
        batch_id: &str,
        status: BatchStatus,
        counts: BatchCounts,
        error_summary: Option<&str>,
    ) -> Result<BatchRecord> {
        let closed = sqlx::query_as::<_, BatchRecord>(
            r#"
            UPDATE batches SET
                ended_at = ?,
                status = ?,
                successful_files = ?,
                failed_files = ?,
                skipped_files = ?,
                error_summary = ?
            WHERE batch_id = ? AND ended_at IS NULL
            RETURNING *
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(status.as_str())
        .bind(counts.successful)
        .bind(counts.failed)
        .bind(counts.skipped)
        .bind(error_summary)
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        match closed {
            Some(batch) => {
                info!(
                    "Finished batch {}: {} ({} ok, {} failed, {} skipped)",
                    batch_id, status, counts.successful, counts.failed, counts.skipped
                );
                Ok(batch)
            }
            None => match self.get_batch(batch_id).await? {
                Some(_) => Err(Error::BatchClosed(batch_id.to_string())),
                None => Err(Error::UnknownBatch(batch_id.to_string())),
            },
        }
    }

    /// Get a batch by id
    pub async fn get_batch(&self, batch_id: &str) -> Result<Option<BatchRecord>> {
        let batch = sqlx::query_as::<_, BatchRecord>("SELECT * FROM batches WHERE batch_id = ?")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(batch)
    }

    /// List batches, newest first
    pub async fn list_batches(&self, limit: usize) -> Result<Vec<BatchRecord>> {
        let batches = sqlx::query_as::<_, BatchRecord>(
            "SELECT * FROM batches ORDER BY started_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(batches)
    }

    // ===== Statistics =====

    /// Counts per status, embedding totals and batch totals
    pub async fn statistics(&self) -> Result<TrackingStats> {
        let mut stats = TrackingStats::default();
        for status in FileStatus::ALL {
            stats.files.insert(status, StatusStats::default());
        }

        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*), COALESCE(SUM(size_bytes), 0) FROM files GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        for (status, count, total_bytes) in rows {
            let status: FileStatus = status.parse()?;
            stats.files.insert(status, StatusStats { count, total_bytes });
        }

        let (total, indexed): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(indexed), 0) FROM embeddings")
                .fetch_one(&self.pool)
                .await?;
        stats.embeddings = EmbeddingStats { total, indexed };

        let (total, running, successful_files, failed_files, skipped_files): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'running' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(successful_files), 0),
                COALESCE(SUM(failed_files), 0),
                COALESCE(SUM(skipped_files), 0)
            FROM batches
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        stats.batches = BatchStats {
            total,
            running,
            successful_files,
            failed_files,
            skipped_files,
        };

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TrackingStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let store = TrackingStore::connect(&config).await.unwrap();
        (store, tmp)
    }

    fn new_file(hash: &str, name: &str) -> NewFile {
        NewFile {
            content_hash: hash.to_string(),
            file_name: name.to_string(),
            size_bytes: 1024,
            file_type: Some("pdf".to_string()),
            source_path: format!("/docs/{}", name),
            ..Default::default()
        }
    }

    fn page(page_number: i32) -> NewEmbedding {
        NewEmbedding {
            page_number,
            vector_id: Uuid::new_v4().to_string(),
            embedding_dimension: 128,
            token_count: 1030,
            indexed: true,
        }
    }

    async fn embedded_file(store: &TrackingStore, hash: &str) -> FileRecord {
        let record = store.create_pending(&new_file(hash, "a.pdf")).await.unwrap();
        let id = record.file_id.clone();
        store
            .transition(
                &id,
                FileStatus::Uploaded,
                TransitionFields::blob("file:///blobs/a", "etl-documents/a"),
            )
            .await
            .unwrap();
        store
            .transition(&id, FileStatus::Processing, TransitionFields::default())
            .await
            .unwrap();
        store
            .transition(&id, FileStatus::Embedded, TransitionFields::default())
            .await
            .unwrap()
    }

    async fn failed_file(store: &TrackingStore, hash: &str) -> FileRecord {
        let record = store.create_pending(&new_file(hash, "f.pdf")).await.unwrap();
        store
            .transition(
                &record.file_id,
                FileStatus::Failed,
                TransitionFields::error("source unreachable"),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (store, _tmp) = setup_test_db().await;

        let record = store.create_pending(&new_file("h1", "a.pdf")).await.unwrap();
        assert_eq!(record.status, FileStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert!(record.blob_url.is_none());

        let found = store.lookup_by_hash("h1").await.unwrap().unwrap();
        assert_eq!(found.file_id, record.file_id);
        assert!(store.lookup_by_hash("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let (store, _tmp) = setup_test_db().await;

        store.create_pending(&new_file("h1", "a.pdf")).await.unwrap();
        let err = store
            .create_pending(&new_file("h1", "renamed.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(h) if h == "h1"));
    }

    #[tokio::test]
    async fn test_concurrent_create_yields_one_record() {
        let (store, _tmp) = setup_test_db().await;

        let a = store.clone();
        let b = store.clone();
        let (ra, rb) = tokio::join!(
            async move { a.create_pending(&new_file("race", "a.pdf")).await },
            async move { b.create_pending(&new_file("race", "b.pdf")).await },
        );

        let wins = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(wins, 1);
        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.file_count(), 1);
    }

    #[tokio::test]
    async fn test_full_lifecycle_sets_stage_fields() {
        let (store, _tmp) = setup_test_db().await;

        let record = embedded_file(&store, "h1").await;
        assert_eq!(record.status, FileStatus::Embedded);
        assert_eq!(record.blob_url.as_deref(), Some("file:///blobs/a"));
        assert_eq!(record.blob_name.as_deref(), Some("etl-documents/a"));
        assert!(record.uploaded_at.is_some());
        assert!(record.processing_at.is_some());
        assert!(record.embedded_at.is_some());
        assert!(record.failed_at.is_none());
        assert!(record.updated_at >= record.created_at);
    }

    #[tokio::test]
    async fn test_invalid_transitions_leave_record_unchanged() {
        let (store, _tmp) = setup_test_db().await;

        let record = store.create_pending(&new_file("h1", "a.pdf")).await.unwrap();
        let err = store
            .transition(&record.file_id, FileStatus::Embedded, TransitionFields::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: FileStatus::Pending,
                to: FileStatus::Embedded,
                ..
            }
        ));

        let after = store.get_file(&record.file_id).await.unwrap().unwrap();
        assert_eq!(after.status, FileStatus::Pending);
        assert_eq!(after.updated_at, record.updated_at);

        let done = embedded_file(&store, "h2").await;
        let err = store
            .transition(&done.file_id, FileStatus::Uploaded, TransitionFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_transition_unknown_file() {
        let (store, _tmp) = setup_test_db().await;

        let err = store
            .transition("nope", FileStatus::Uploaded, TransitionFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFile(_)));
    }

    #[tokio::test]
    async fn test_failed_records_error_and_embedded_clears_it() {
        let (store, _tmp) = setup_test_db().await;

        let failed = failed_file(&store, "h1").await;
        assert_eq!(failed.status, FileStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("source unreachable"));
        assert!(failed.failed_at.is_some());

        let retried = store.retry(&failed.file_id, 3).await.unwrap();
        assert_eq!(retried.status, FileStatus::Pending);
        assert_eq!(retried.retry_count, 1);

        let id = retried.file_id.clone();
        store
            .transition(&id, FileStatus::Uploaded, TransitionFields::blob("u", "n"))
            .await
            .unwrap();
        store
            .transition(&id, FileStatus::Processing, TransitionFields::default())
            .await
            .unwrap();
        let done = store
            .transition(&id, FileStatus::Embedded, TransitionFields::default())
            .await
            .unwrap();
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn test_retry_limit() {
        let (store, _tmp) = setup_test_db().await;

        let record = failed_file(&store, "h1").await;
        let id = record.file_id.clone();

        for attempt in 1..=2 {
            let retried = store.retry(&id, 2).await.unwrap();
            assert_eq!(retried.retry_count, attempt);
            store
                .transition(&id, FileStatus::Failed, TransitionFields::error("again"))
                .await
                .unwrap();
        }

        let err = store.retry(&id, 2).await.unwrap_err();
        assert!(matches!(
            err,
            Error::RetryLimitExceeded {
                retry_count: 2,
                max_retries: 2,
                ..
            }
        ));
        let after = store.get_file(&id).await.unwrap().unwrap();
        assert_eq!(after.status, FileStatus::Failed);
        assert_eq!(after.retry_count, 2);
    }

    #[tokio::test]
    async fn test_retry_requires_failed() {
        let (store, _tmp) = setup_test_db().await;

        let record = store.create_pending(&new_file("h1", "a.pdf")).await.unwrap();
        let err = store.retry(&record.file_id, 3).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_transition_to_pending_uses_store_limit() {
        let tmp = TempDir::new().unwrap();
        let store = TrackingStore::open(&tmp.path().join("t.db"), 0)
            .await
            .unwrap();

        let record = failed_file(&store, "h1").await;
        let err = store
            .transition(&record.file_id, FileStatus::Pending, TransitionFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RetryLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_embeddings_unique_per_page() {
        let (store, _tmp) = setup_test_db().await;

        let record = store.create_pending(&new_file("h1", "a.pdf")).await.unwrap();
        store.record_embedding(&record.file_id, &page(1)).await.unwrap();
        store.record_embedding(&record.file_id, &page(2)).await.unwrap();

        let err = store
            .record_embedding(&record.file_id, &page(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePage { page: 1, .. }));

        let pages: Vec<i32> = store
            .list_embeddings(&record.file_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.page_number)
            .collect();
        assert_eq!(pages, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_embedding_requires_file_and_valid_page() {
        let (store, _tmp) = setup_test_db().await;

        let err = store.record_embedding("ghost", &page(1)).await.unwrap_err();
        assert!(matches!(err, Error::UnknownFile(_)));

        let record = store.create_pending(&new_file("h1", "a.pdf")).await.unwrap();
        let err = store
            .record_embedding(&record.file_id, &page(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPage { page: 0, .. }));
        assert!(store.list_embeddings(&record.file_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades_embeddings() {
        let (store, _tmp) = setup_test_db().await;

        let record = embedded_file(&store, "h1").await;
        store.record_embedding(&record.file_id, &page(1)).await.unwrap();

        assert!(store.delete_file(&record.file_id).await.unwrap());
        assert!(store.list_embeddings(&record.file_id).await.unwrap().is_empty());
        assert!(store.lookup_by_hash("h1").await.unwrap().is_none());
        assert!(!store.delete_file(&record.file_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_status_oldest_first() {
        let (store, _tmp) = setup_test_db().await;

        for i in 0..3 {
            store
                .create_pending(&new_file(&format!("h{i}"), &format!("{i}.pdf")))
                .await
                .unwrap();
        }

        let pending = store.list_by_status(FileStatus::Pending, None).await.unwrap();
        let names: Vec<&str> = pending.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["0.pdf", "1.pdf", "2.pdf"]);

        let limited = store
            .list_by_status(FileStatus::Pending, Some(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert!(store
            .list_by_status(FileStatus::Failed, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reset_stuck() {
        let (store, _tmp) = setup_test_db().await;

        let record = store.create_pending(&new_file("h1", "a.pdf")).await.unwrap();
        let id = record.file_id.clone();
        store
            .transition(&id, FileStatus::Uploaded, TransitionFields::blob("u", "n"))
            .await
            .unwrap();
        store
            .transition(&id, FileStatus::Processing, TransitionFields::default())
            .await
            .unwrap();

        assert_eq!(store.reset_stuck(FileStatus::Processing).await.unwrap(), 1);
        let after = store.get_file(&id).await.unwrap().unwrap();
        assert_eq!(after.status, FileStatus::Uploaded);
        assert_eq!(after.blob_url.as_deref(), Some("u"));

        assert_eq!(store.reset_stuck(FileStatus::Processing).await.unwrap(), 0);
        assert_eq!(store.reset_stuck(FileStatus::Pending).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_statistics() {
        let (store, _tmp) = setup_test_db().await;

        let done = embedded_file(&store, "h1").await;
        store.record_embedding(&done.file_id, &page(1)).await.unwrap();
        failed_file(&store, "h2").await;
        store.create_pending(&new_file("h3", "c.pdf")).await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.file_count(), 3);
        assert_eq!(stats.count(FileStatus::Embedded), 1);
        assert_eq!(stats.count(FileStatus::Failed), 1);
        assert_eq!(stats.count(FileStatus::Pending), 1);
        assert_eq!(stats.count(FileStatus::Processing), 0);
        assert_eq!(stats.files[&FileStatus::Pending].total_bytes, 1024);
        assert_eq!(stats.embeddings.total, 1);
        assert_eq!(stats.embeddings.indexed, 1);
    }

    #[tokio::test]
    async fn test_batch_lifecycle() {
        let (store, _tmp) = setup_test_db().await;

        let batch = store.start_batch(3).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Running);
        assert!(batch.ended_at.is_none());

        let mut counts = BatchCounts {
            successful: 1,
            ..Default::default()
        };
        store
            .update_batch_progress(&batch.batch_id, counts)
            .await
            .unwrap();

        let err = store
            .update_batch_progress(&batch.batch_id, BatchCounts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BatchRegression(_)));

        counts.failed = 1;
        counts.skipped = 1;
        let closed = store
            .finish_batch(&batch.batch_id, BatchStatus::Partial, counts, Some("1 failed"))
            .await
            .unwrap();
        assert_eq!(closed.status, BatchStatus::Partial);
        assert!(closed.ended_at.is_some());
        assert_eq!(closed.successful_files + closed.failed_files + closed.skipped_files, 3);

        let err = store
            .finish_batch(&batch.batch_id, BatchStatus::Completed, counts, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BatchClosed(_)));

        let err = store
            .update_batch_progress(&batch.batch_id, counts)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BatchClosed(_)));

        let listed = store.list_batches(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.batches.total, 1);
        assert_eq!(stats.batches.running, 0);
        assert_eq!(stats.batches.skipped_files, 1);
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let (store, _tmp) = setup_test_db().await;

        let err = store
            .finish_batch("nope", BatchStatus::Completed, BatchCounts::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownBatch(_)));
    }
}
