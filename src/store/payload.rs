//! Point payloads and identifiers

use crate::error::{Error, Result};
use qdrant_client::Payload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload stored alongside every page vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub file_id: String,
    pub page: i32,
    pub filename: String,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    pub model: String,
    pub indexed_at: String,
}

impl VectorPayload {
    pub fn to_qdrant_payload(&self) -> Result<Payload> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::Index(format!("Invalid payload: {}", e)))?;
        payload_from_value(value)
    }

    /// Deterministic point id for this page
    pub fn vector_id(&self) -> Uuid {
        vector_id_for(&self.file_id, self.page)
    }
}

fn payload_from_value(value: serde_json::Value) -> Result<Payload> {
    Payload::try_from(value).map_err(|e| Error::Index(format!("Invalid payload: {}", e)))
}

/// UUID v5 over `file_id:page`, so re-indexing a page overwrites its point
pub fn vector_id_for(file_id: &str, page: i32) -> Uuid {
    let key = format!("{}:{}", file_id, page);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}
