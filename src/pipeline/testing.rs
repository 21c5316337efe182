//! In-memory collaborators for pipeline tests

use super::batch::BatchCoordinator;
use super::stage::{Collaborators, StageRunner, WorkItem};
use crate::blob::BlobStore;
use crate::convert::{DocumentConverter, PageImage};
use crate::embed::{EmbeddingModel, PageEmbedding};
use crate::error::{Error, Result};
use crate::hash::hash_bytes;
use crate::source::{DocumentSource, SourceFile};
use crate::store::{VectorPayload, VectorStore};
use crate::tracking::{FileRecord, NewEmbedding, NewFile, TrackingStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_DIMENSION: usize = 4;

#[derive(Default)]
pub struct MockSource {
    files: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: Mutex<HashSet<String>>,
    downloads: AtomicUsize,
}

impl MockSource {
    pub fn add_file(&self, path: &str, content: &[u8]) -> SourceFile {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        SourceFile {
            name,
            path: path.to_string(),
            size: content.len() as u64,
            modified_at: Some("2024-01-01T00:00:00Z".to_string()),
        }
    }

    /// A listed file whose download will fail
    pub fn broken_file(&self, path: &str) -> SourceFile {
        let file = self.add_file(path, b"unreachable");
        self.unavailable.lock().unwrap().insert(path.to_string());
        file
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MockSource {
    async fn list(&self, path: &str, extensions: &[String]) -> Result<Vec<SourceFile>> {
        let files = self.files.lock().unwrap();
        let mut paths: Vec<&String> = files
            .keys()
            .filter(|p| p.starts_with(path))
            .filter(|p| {
                extensions.is_empty()
                    || extensions
                        .iter()
                        .any(|ext| p.to_lowercase().ends_with(&ext.to_lowercase()))
            })
            .collect();
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|p| SourceFile {
                name: p.rsplit('/').next().unwrap_or(p).to_string(),
                path: p.clone(),
                size: files[p].len() as u64,
                modified_at: None,
            })
            .collect())
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.lock().unwrap().contains(path) {
            return Err(Error::SourceUnavailable(format!("{} is offline", path)));
        }
        let content = self
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        tokio::fs::write(dest, &content).await?;
        Ok(content.len() as u64)
    }
}

#[derive(Default)]
pub struct MockBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    uploads: AtomicUsize,
}

impl MockBlobStore {
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn upload(&self, local: &Path, name: &str) -> Result<String> {
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().unwrap().insert(name.to_string(), bytes);
        Ok(format!("mem://blobs/{}", name))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.blobs.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Page counts and delays are keyed by file name; unknown files have one page
#[derive(Default)]
pub struct MockConverter {
    pages: Mutex<HashMap<String, usize>>,
    delay: Mutex<Option<Duration>>,
    file_delays: Mutex<HashMap<String, Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockConverter {
    pub fn set_pages(&self, file_name: &str, pages: usize) {
        self.pages
            .lock()
            .unwrap()
            .insert(file_name.to_string(), pages);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Delay conversions of `file_name` only
    pub fn set_file_delay(&self, file_name: &str, delay: Duration) {
        self.file_delays
            .lock()
            .unwrap()
            .insert(file_name.to_string(), delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most conversions observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentConverter for MockConverter {
    async fn to_pages(&self, path: &Path, _file_type: &str) -> Result<Vec<PageImage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = self
            .file_delays
            .lock()
            .unwrap()
            .get(&name)
            .copied()
            .or(*self.delay.lock().unwrap());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let count = self.pages.lock().unwrap().get(&name).copied().unwrap_or(1);
        Ok((1..=count as i32)
            .map(|page_number| PageImage {
                page_number,
                bytes: vec![page_number as u8],
                width: 8,
                height: 8,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MockEmbedder {
    failing_pages: Mutex<HashSet<i32>>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn fail_on_page(&self, page: i32) {
        self.failing_pages.lock().unwrap().insert(page);
    }

    pub fn clear_failures(&self) {
        self.failing_pages.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedder {
    async fn embed(&self, page: &PageImage) -> Result<PageEmbedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_pages.lock().unwrap().contains(&page.page_number) {
            return Err(Error::Model(format!(
                "model rejected page {}",
                page.page_number
            )));
        }
        let mut vector = vec![0.0; TEST_DIMENSION];
        vector[page.page_number as usize % TEST_DIMENSION] = 1.0;
        Ok(PageEmbedding {
            vector,
            dimension: TEST_DIMENSION,
            token_count: 16,
        })
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[derive(Default)]
pub struct MockVectorStore {
    points: Mutex<HashMap<String, (Vec<f32>, VectorPayload)>>,
}

impl MockVectorStore {
    pub fn point_count(&self, file_id: &str) -> usize {
        self.points
            .lock()
            .unwrap()
            .values()
            .filter(|(_, p)| p.file_id == file_id)
            .count()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn upsert(&self, vector: Vec<f32>, payload: VectorPayload) -> Result<String> {
        let id = payload.vector_id().to_string();
        self.points
            .lock()
            .unwrap()
            .insert(id.clone(), (vector, payload));
        Ok(id)
    }

    async fn delete_by_file_id(&self, file_id: &str) -> Result<()> {
        self.points
            .lock()
            .unwrap()
            .retain(|_, (_, p)| p.file_id != file_id);
        Ok(())
    }
}

/// A tracking store in a temp dir wired to in-memory collaborators
pub struct TestHarness {
    pub store: TrackingStore,
    pub runner: StageRunner,
    pub source: Arc<MockSource>,
    pub blobs: Arc<MockBlobStore>,
    pub converter: Arc<MockConverter>,
    pub embedder: Arc<MockEmbedder>,
    pub vectors: Arc<MockVectorStore>,
    pub tmp: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Self {
        let tmp = TempDir::new().unwrap();
        let store = TrackingStore::open(&tmp.path().join("tracking.db"), 3)
            .await
            .unwrap();

        let source = Arc::new(MockSource::default());
        let blobs = Arc::new(MockBlobStore::default());
        let converter = Arc::new(MockConverter::default());
        let embedder = Arc::new(MockEmbedder::default());
        let vectors = Arc::new(MockVectorStore::default());

        let collaborators = Collaborators {
            blobs: blobs.clone(),
            converter: converter.clone(),
            embedder: embedder.clone(),
            vectors: vectors.clone(),
        };
        let runner = StageRunner::new(store.clone(), collaborators, "etl-documents", timeout);

        Self {
            store,
            runner,
            source,
            blobs,
            converter,
            embedder,
            vectors,
            tmp,
        }
    }

    pub fn coordinator(&self) -> BatchCoordinator {
        BatchCoordinator::new(self.store.clone(), self.source.clone(), self.runner.clone())
    }

    /// Write `content` to a fresh local file for `record`
    pub fn work_item(&self, record: &FileRecord, content: &[u8]) -> WorkItem {
        let dir = self.tmp.path().join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir).unwrap();
        let local = dir.join(&record.file_name);
        std::fs::write(&local, content).unwrap();
        WorkItem::new(local, record)
    }

    /// A new pending record for `content` with a `pages`-page rendering
    pub async fn pending_record(
        &self,
        name: &str,
        content: &[u8],
        pages: usize,
    ) -> (FileRecord, WorkItem) {
        self.converter.set_pages(name, pages);
        let record = self
            .store
            .create_pending(&NewFile {
                content_hash: hash_bytes(content),
                file_name: name.to_string(),
                size_bytes: content.len() as i64,
                file_type: Some("pdf".to_string()),
                source_path: format!("/inbox/{}", name),
                ..Default::default()
            })
            .await
            .unwrap();
        let work = self.work_item(&record, content);
        (record, work)
    }

    /// Index one page out of band, as an interrupted run would have
    pub async fn index_page(&self, record: &FileRecord, page: i32) {
        let payload = VectorPayload {
            file_id: record.file_id.clone(),
            page,
            filename: record.file_name.clone(),
            content_hash: record.content_hash.clone(),
            blob_url: record.blob_url.clone(),
            file_type: record.file_type.clone(),
            model: "mock-model".to_string(),
            indexed_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let vector_id = self
            .vectors
            .upsert(vec![1.0; TEST_DIMENSION], payload)
            .await
            .unwrap();
        self.store
            .record_embedding(
                &record.file_id,
                &NewEmbedding {
                    page_number: page,
                    vector_id,
                    embedding_dimension: TEST_DIMENSION as i32,
                    token_count: 16,
                    indexed: true,
                },
            )
            .await
            .unwrap();
    }
}
