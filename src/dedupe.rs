//! Content-based duplicate detection
//!
//! Duplicates are decided by fingerprint alone. The check is advisory; the
//! claim is authoritative because it relies on the unique constraint on
//! `content_hash`, so two workers that both saw "new" cannot both insert.

use crate::error::{Error, Result};
use crate::tracking::{EmbeddingRecord, FileRecord, NewFile, TrackingStore};
use tracing::debug;

/// Result of a read-only duplicate check
#[derive(Debug, Clone)]
pub enum DuplicateCheck {
    New,
    Duplicate {
        existing: FileRecord,
        embeddings: Vec<EmbeddingRecord>,
    },
}

/// Result of claiming a fingerprint
#[derive(Debug, Clone)]
pub enum Claim {
    /// This caller inserted the record and owns driving it forward
    Claimed(FileRecord),
    /// Someone else already tracks this content
    Duplicate {
        existing: FileRecord,
        embeddings: Vec<EmbeddingRecord>,
    },
}

/// Duplicate detector over the tracking store
#[derive(Clone)]
pub struct DuplicateDetector {
    store: TrackingStore,
}

impl DuplicateDetector {
    pub fn new(store: TrackingStore) -> Self {
        Self { store }
    }

    /// Whether the content behind `content_hash` is already tracked
    pub async fn check(&self, content_hash: &str) -> Result<DuplicateCheck> {
        match self.store.lookup_by_hash(content_hash).await? {
            Some(existing) => {
                let embeddings = self.store.list_embeddings(&existing.file_id).await?;
                Ok(DuplicateCheck::Duplicate {
                    existing,
                    embeddings,
                })
            }
            None => Ok(DuplicateCheck::New),
        }
    }

    /// Insert a pending record unless the content is already tracked
    pub async fn claim(&self, file: &NewFile) -> Result<Claim> {
        match self.store.create_pending(file).await {
            Ok(record) => Ok(Claim::Claimed(record)),
            Err(Error::DuplicateKey(hash)) => {
                debug!("Lost claim race for {}", hash);
                match self.check(&hash).await? {
                    DuplicateCheck::Duplicate {
                        existing,
                        embeddings,
                    } => Ok(Claim::Duplicate {
                        existing,
                        embeddings,
                    }),
                    // Deleted between the insert and the lookup
                    DuplicateCheck::New => Err(Error::DuplicateKey(hash)),
                }
            }
            Err(e) => Err(e),
        }
    }
}
