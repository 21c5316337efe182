//! Default values for configuration

/// Default tracking database file name (relative to the base dir)
pub fn default_db_file_name() -> String {
    "tracking.db".to_string()
}

/// Default maximum retries per failed file
pub fn default_max_retries() -> i32 {
    3
}

/// Default: reset records stuck in `processing` when a batch starts
pub fn default_reset_stuck() -> bool {
    true
}

/// Default document extensions
pub fn default_source_extensions() -> Vec<String> {
    [".pdf", ".png", ".jpg", ".jpeg", ".bmp", ".tiff", ".webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Default blob folder prefix
pub fn default_blob_prefix() -> String {
    "etl-documents".to_string()
}

/// Default rasterization DPI for PDF pages
pub fn default_converter_dpi() -> u32 {
    200
}

/// Default pdftoppm binary
pub fn default_pdftoppm_path() -> String {
    "pdftoppm".to_string()
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("DOCFLOW_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default vision embedding model
pub fn default_embedding_model() -> String {
    "vidore/colpali-v1.2".to_string()
}

/// Default embedding dimension (ColPali patch embeddings, mean-pooled)
pub fn default_embedding_dimension() -> usize {
    128
}

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "colpali-documents".to_string()
}

/// Default number of outcomes committed to the batch record at a time
pub fn default_batch_size() -> usize {
    10
}

/// Default number of files in flight
pub fn default_concurrency() -> usize {
    1
}

/// Default: skip content that has already been tracked
pub fn default_skip_duplicates() -> bool {
    true
}

/// Default: retry failed files at the start of a run
pub fn default_resume_failed() -> bool {
    false
}

/// Default per-call collaborator timeout in seconds
pub fn default_collaborator_timeout() -> u64 {
    300
}
