//! Single-file stage execution

use crate::blob::{blob_name, BlobStore};
use crate::convert::{DocumentConverter, PageImage};
use crate::embed::EmbeddingModel;
use crate::error::{Error, Result};
use crate::store::{VectorPayload, VectorStore};
use crate::tracking::{FileRecord, FileStatus, NewEmbedding, TrackingStore, TransitionFields};
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One step of the pipeline, bound to one status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// pending -> uploaded
    Upload,
    /// uploaded -> processing, then page conversion
    Convert,
    /// processing -> embedded
    EmbedIndex,
}

impl Stage {
    /// Stage that moves a record out of `status`, if any
    pub fn for_status(status: FileStatus) -> Option<Stage> {
        match status {
            FileStatus::Pending => Some(Stage::Upload),
            FileStatus::Uploaded => Some(Stage::Convert),
            FileStatus::Processing => Some(Stage::EmbedIndex),
            FileStatus::Embedded | FileStatus::Failed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Convert => "convert",
            Stage::EmbedIndex => "embed_index",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local working state for one file while it moves through the stages
#[derive(Debug)]
pub struct WorkItem {
    pub local_path: PathBuf,
    pub file_type: String,
    pages: Option<Vec<PageImage>>,
}

impl WorkItem {
    pub fn new(local_path: impl Into<PathBuf>, record: &FileRecord) -> Self {
        let local_path = local_path.into();
        let file_type = record
            .file_type
            .clone()
            .or_else(|| {
                Path::new(&record.file_name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase())
            })
            .unwrap_or_default();
        Self {
            local_path,
            file_type,
            pages: None,
        }
    }
}

/// The external systems a stage may call
#[derive(Clone)]
pub struct Collaborators {
    pub blobs: Arc<dyn BlobStore>,
    pub converter: Arc<dyn DocumentConverter>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub vectors: Arc<dyn VectorStore>,
}

/// Executes pipeline stages against single files
#[derive(Clone)]
pub struct StageRunner {
    store: TrackingStore,
    collaborators: Collaborators,
    blob_prefix: String,
    timeout: Duration,
}

impl StageRunner {
    pub fn new(
        store: TrackingStore,
        collaborators: Collaborators,
        blob_prefix: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            collaborators,
            blob_prefix: blob_prefix.into(),
            timeout,
        }
    }

    /// Run a collaborator call under the configured timeout
    pub async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Execute the one stage that applies to the record's current status.
    ///
    /// Collaborator failures are recorded as a `failed` transition and the
    /// failed record is returned. Tracking-store errors are returned as-is.
    pub async fn run_stage(&self, record: &FileRecord, work: &mut WorkItem) -> Result<FileRecord> {
        let Some(stage) = Stage::for_status(record.status) else {
            return Ok(record.clone());
        };

        debug!(file_id = %record.file_id, stage = %stage, "Running stage");

        let result = match stage {
            Stage::Upload => self.upload(record, work).await,
            Stage::Convert => self.convert(record, work).await,
            Stage::EmbedIndex => self.embed_index(record, work).await,
        };

        match result {
            Ok(updated) => Ok(updated),
            Err(e) if e.is_collaborator() => {
                warn!(file_id = %record.file_id, stage = %stage, "Stage failed: {}", e);
                self.store
                    .transition(
                        &record.file_id,
                        FileStatus::Failed,
                        TransitionFields::error(format!("{}: {}", stage, e)),
                    )
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Run stages until the record is `embedded` or `failed`
    pub async fn run_to_completion(
        &self,
        record: FileRecord,
        work: &mut WorkItem,
    ) -> Result<FileRecord> {
        let mut record = record;
        while !record.status.is_terminal() {
            record = self.run_stage(&record, work).await?;
        }
        Ok(record)
    }

    async fn upload(&self, record: &FileRecord, work: &WorkItem) -> Result<FileRecord> {
        let blobs = &self.collaborators.blobs;

        if let (Some(url), Some(name)) = (&record.blob_url, &record.blob_name) {
            if self.bounded("blob exists", blobs.exists(name)).await? {
                debug!(file_id = %record.file_id, "Blob already stored, skipping upload");
                return self
                    .store
                    .transition(
                        &record.file_id,
                        FileStatus::Uploaded,
                        TransitionFields::blob(url, name),
                    )
                    .await;
            }
        }

        let name = blob_name(&self.blob_prefix, &record.file_id, &record.file_name);
        let url = self
            .bounded("blob upload", blobs.upload(&work.local_path, &name))
            .await?;

        self.store
            .transition(
                &record.file_id,
                FileStatus::Uploaded,
                TransitionFields::blob(url, name),
            )
            .await
    }

    async fn convert(&self, record: &FileRecord, work: &mut WorkItem) -> Result<FileRecord> {
        let processing = self
            .store
            .transition(
                &record.file_id,
                FileStatus::Processing,
                TransitionFields::default(),
            )
            .await?;

        let pages = self.render_pages(work).await?;
        debug!(file_id = %record.file_id, pages = pages.len(), "Converted document");
        work.pages = Some(pages);
        Ok(processing)
    }

    async fn render_pages(&self, work: &WorkItem) -> Result<Vec<PageImage>> {
        let mut pages = self
            .bounded(
                "convert",
                self.collaborators
                    .converter
                    .to_pages(&work.local_path, &work.file_type),
            )
            .await?;

        if pages.is_empty() {
            return Err(Error::Conversion(format!(
                "{} produced no pages",
                work.local_path.display()
            )));
        }
        pages.sort_by_key(|p| p.page_number);
        Ok(pages)
    }

    async fn embed_index(&self, record: &FileRecord, work: &mut WorkItem) -> Result<FileRecord> {
        let pages = match work.pages.take() {
            Some(pages) => pages,
            // Resumed in processing: pages were never carried over
            None => self.render_pages(work).await?,
        };

        let done: HashSet<i32> = self
            .store
            .list_embeddings(&record.file_id)
            .await?
            .into_iter()
            .map(|e| e.page_number)
            .collect();

        let embedder = &self.collaborators.embedder;
        for page in &pages {
            if done.contains(&page.page_number) {
                debug!(file_id = %record.file_id, page = page.page_number, "Page already indexed");
                continue;
            }

            let embedding = self.bounded("embed", embedder.embed(page)).await?;
            let dimension = embedding.dimension;
            let token_count = embedding.token_count;

            let payload = VectorPayload {
                file_id: record.file_id.clone(),
                page: page.page_number,
                filename: record.file_name.clone(),
                content_hash: record.content_hash.clone(),
                blob_url: record.blob_url.clone(),
                file_type: record.file_type.clone(),
                model: embedder.model_name().to_string(),
                indexed_at: Utc::now().to_rfc3339(),
            };
            let vector_id = self
                .bounded(
                    "index",
                    self.collaborators.vectors.upsert(embedding.vector, payload),
                )
                .await?;

            self.store
                .record_embedding(
                    &record.file_id,
                    &NewEmbedding {
                        page_number: page.page_number,
                        vector_id,
                        embedding_dimension: dimension as i32,
                        token_count: token_count as i32,
                        indexed: true,
                    },
                )
                .await?;
        }

        self.store
            .transition(
                &record.file_id,
                FileStatus::Embedded,
                TransitionFields::default(),
            )
            .await
    }
}
