//! Custom error types for docflow

use crate::tracking::FileStatus;
use thiserror::Error;

/// Main error type for docflow operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // ===== Tracking store invariants =====
    #[error("Content hash already tracked: {0}")]
    DuplicateKey(String),

    #[error("Invalid transition for file {file_id}: {from} -> {to}")]
    InvalidTransition {
        file_id: String,
        from: FileStatus,
        to: FileStatus,
    },

    #[error("Unknown file: {0}")]
    UnknownFile(String),

    #[error("Page {page} of file {file_id} already has an embedding")]
    DuplicatePage { file_id: String, page: i32 },

    #[error("Invalid page {page} for file {file_id}: pages start at 1")]
    InvalidPage { file_id: String, page: i32 },

    #[error("Retry limit exceeded for file {file_id} ({retry_count}/{max_retries})")]
    RetryLimitExceeded {
        file_id: String,
        retry_count: i32,
        max_retries: i32,
    },

    #[error("Batch {0} is already closed")]
    BatchClosed(String),

    #[error("Unknown batch: {0}")]
    UnknownBatch(String),

    #[error("Batch {0} aggregates cannot decrease")]
    BatchRegression(String),

    // ===== Collaborator boundaries =====
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Content of {path} changed at source (expected {expected}, got {actual})")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    // ===== Infrastructure =====
    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'docflow init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error came from an external collaborator (source, blob
    /// store, converter, model, vector store) rather than from the tracking
    /// store's own invariants.
    ///
    /// Collaborator errors become a `failed` transition on the file; anything
    /// else propagates to the caller.
    pub fn is_collaborator(&self) -> bool {
        matches!(
            self,
            Error::SourceUnavailable(_)
                | Error::NotFound(_)
                | Error::Storage(_)
                | Error::Conversion(_)
                | Error::Model(_)
                | Error::Index(_)
                | Error::Timeout { .. }
                | Error::HashMismatch { .. }
                | Error::Qdrant(_)
                | Error::Http(_)
                | Error::Io(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for docflow
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_classification() {
        assert!(Error::Storage("disk full".to_string()).is_collaborator());
        assert!(Error::Timeout {
            operation: "embed".to_string(),
            secs: 30
        }
        .is_collaborator());
        assert!(!Error::DuplicateKey("abc".to_string()).is_collaborator());
        assert!(!Error::InvalidTransition {
            file_id: "f".to_string(),
            from: FileStatus::Embedded,
            to: FileStatus::Uploaded,
        }
        .is_collaborator());
        assert!(!Error::UnknownFile("f".to_string()).is_collaborator());
        assert!(!Error::InvalidPage {
            file_id: "f".to_string(),
            page: 0
        }
        .is_collaborator());
    }
}
