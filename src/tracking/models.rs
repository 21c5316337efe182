//! Row types and the file lifecycle

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Lifecycle status of a tracked file
///
/// ```text
/// pending -> uploaded -> processing -> embedded
///    \           \            \
///     +-----------+------------+--> failed --(retry)--> pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploaded,
    Processing,
    Embedded,
    Failed,
}

impl FileStatus {
    pub const ALL: [FileStatus; 5] = [
        FileStatus::Pending,
        FileStatus::Uploaded,
        FileStatus::Processing,
        FileStatus::Embedded,
        FileStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Uploaded => "uploaded",
            FileStatus::Processing => "processing",
            FileStatus::Embedded => "embedded",
            FileStatus::Failed => "failed",
        }
    }

    /// Terminal for the current attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Embedded | FileStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// `failed -> pending` is an edge, but only the retry path may take it.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, next),
            (Pending, Uploaded)
                | (Uploaded, Processing)
                | (Processing, Embedded)
                | (Pending, Failed)
                | (Uploaded, Failed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }

    /// Next status on the success path
    pub fn next(&self) -> Option<FileStatus> {
        match self {
            FileStatus::Pending => Some(FileStatus::Uploaded),
            FileStatus::Uploaded => Some(FileStatus::Processing),
            FileStatus::Processing => Some(FileStatus::Embedded),
            FileStatus::Embedded | FileStatus::Failed => None,
        }
    }

    /// Column stamped when a record enters this status
    pub(crate) fn timestamp_column(&self) -> Option<&'static str> {
        match self {
            FileStatus::Pending => None,
            FileStatus::Uploaded => Some("uploaded_at"),
            FileStatus::Processing => Some("processing_at"),
            FileStatus::Embedded => Some("embedded_at"),
            FileStatus::Failed => Some("failed_at"),
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(FileStatus::Pending),
            "uploaded" => Ok(FileStatus::Uploaded),
            "processing" => Ok(FileStatus::Processing),
            "embedded" => Ok(FileStatus::Embedded),
            "failed" => Ok(FileStatus::Failed),
            _ => Err(Error::Config(format!("Unknown file status: {}", s))),
        }
    }
}

impl TryFrom<String> for FileStatus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Batch run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Running,
    Completed,
    Partial,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Partial => "partial",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(BatchStatus::Running),
            "completed" => Ok(BatchStatus::Completed),
            "partial" => Ok(BatchStatus::Partial),
            "cancelled" => Ok(BatchStatus::Cancelled),
            _ => Err(Error::Config(format!("Unknown batch status: {}", s))),
        }
    }
}

impl TryFrom<String> for BatchStatus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A tracked file
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub content_hash: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub file_type: Option<String>,
    pub source_path: String,
    pub source_modified_at: Option<String>,
    pub blob_url: Option<String>,
    pub blob_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: FileStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub metadata_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub uploaded_at: Option<String>,
    pub processing_at: Option<String>,
    pub embedded_at: Option<String>,
    pub failed_at: Option<String>,
}

/// Descriptive fields for a file seen for the first time
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub content_hash: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub file_type: Option<String>,
    pub source_path: String,
    pub source_modified_at: Option<String>,
    pub metadata_json: Option<String>,
}

/// Stage output carried by a status transition
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    pub blob_url: Option<String>,
    pub blob_name: Option<String>,
    pub error_message: Option<String>,
}

impl TransitionFields {
    pub fn blob(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            blob_url: Some(url.into()),
            blob_name: Some(name.into()),
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// An indexed page vector
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub embedding_id: String,
    pub file_id: String,
    pub page_number: i32,
    pub vector_id: String,
    pub embedding_dimension: i32,
    pub token_count: i32,
    pub indexed: bool,
    pub created_at: String,
}

/// A batch run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub total_files: i64,
    pub successful_files: i64,
    pub failed_files: i64,
    pub skipped_files: i64,
    #[sqlx(try_from = "String")]
    pub status: BatchStatus,
    pub error_summary: Option<String>,
}

/// Per-outcome counters committed to a batch record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub successful: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl BatchCounts {
    pub fn processed(&self) -> i64 {
        self.successful + self.failed + self.skipped
    }
}

/// Count and byte total for one status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusStats {
    pub count: i64,
    pub total_bytes: i64,
}

/// Embedding totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total: i64,
    pub indexed: i64,
}

/// Batch totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: i64,
    pub running: i64,
    pub successful_files: i64,
    pub failed_files: i64,
    pub skipped_files: i64,
}

/// Aggregate view of the tracking database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingStats {
    pub files: BTreeMap<FileStatus, StatusStats>,
    pub embeddings: EmbeddingStats,
    pub batches: BatchStats,
}

impl TrackingStats {
    pub fn file_count(&self) -> i64 {
        self.files.values().map(|s| s.count).sum()
    }

    pub fn count(&self, status: FileStatus) -> i64 {
        self.files.get(&status).map(|s| s.count).unwrap_or(0)
    }
}
