//! SQLite schema definition

/// SQL schema for the tracking database
pub const SCHEMA_SQL: &str = r#"
-- Files: one row per distinct content fingerprint
CREATE TABLE IF NOT EXISTS files (
    file_id TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL UNIQUE,
    file_name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    file_type TEXT,
    source_path TEXT NOT NULL,
    source_modified_at TEXT,
    blob_url TEXT,
    blob_name TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'uploaded', 'processing', 'embedded', 'failed')),
    error_message TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
    metadata_json TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    uploaded_at TEXT,
    processing_at TEXT,
    embedded_at TEXT,
    failed_at TEXT
);

-- Embeddings: one row per indexed page vector, owned by a file
CREATE TABLE IF NOT EXISTS embeddings (
    embedding_id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
    page_number INTEGER NOT NULL CHECK (page_number >= 1),
    vector_id TEXT NOT NULL,
    embedding_dimension INTEGER NOT NULL,
    token_count INTEGER NOT NULL,
    indexed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(file_id, page_number)
);

-- Batches: one row per batch run
CREATE TABLE IF NOT EXISTS batches (
    batch_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    total_files INTEGER NOT NULL DEFAULT 0,
    successful_files INTEGER NOT NULL DEFAULT 0,
    failed_files INTEGER NOT NULL DEFAULT 0,
    skipped_files INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'running'
        CHECK (status IN ('running', 'completed', 'partial', 'cancelled')),
    error_summary TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_files_status_created ON files(status, created_at);
CREATE INDEX IF NOT EXISTS idx_files_type ON files(file_type);
CREATE INDEX IF NOT EXISTS idx_embeddings_file ON embeddings(file_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_vector ON embeddings(vector_id);
CREATE INDEX IF NOT EXISTS idx_batches_started ON batches(started_at);
"#;
