//! Configuration management for docflow
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! Every component receives the pieces it needs at construction; nothing
//! below this module reads process environment on its own.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tracking database configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Document source configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Blob storage configuration
    #[serde(default)]
    pub blob: BlobConfig,

    /// Page conversion configuration
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Qdrant configuration
    #[serde(default)]
    pub qdrant: QdrantConfig,

    /// Batch processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Tracking database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Database file name, resolved against the base directory
    #[serde(default = "default_db_file_name")]
    pub db_file: String,

    /// Maximum number of retries for a failed file
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,

    /// Revert records stuck in `processing` when a batch starts
    #[serde(default = "default_reset_stuck")]
    pub reset_stuck: bool,
}

/// Document source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root directory of the document source
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// File extensions to include (with leading dot)
    #[serde(default = "default_source_extensions")]
    pub extensions: Vec<String>,
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Directory acting as the blob container (defaults to `<base>/blobs`)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Folder prefix for blob names
    #[serde(default = "default_blob_prefix")]
    pub prefix: String,
}

/// Page conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// DPI for PDF rasterization
    #[serde(default = "default_converter_dpi")]
    pub dpi: u32,

    /// Path to the pdftoppm binary
    #[serde(default = "default_pdftoppm_path")]
    pub pdftoppm: String,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the HTTP embedding backend
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

/// Qdrant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub api_key_env: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Outcomes committed to the batch record per reporting chunk
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Files processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Skip content whose hash is already tracked
    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,

    /// Retry failed files at the start of every run
    #[serde(default = "default_resume_failed")]
    pub resume_failed: bool,

    /// Timeout applied to each collaborator call, in seconds
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for docflow data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite tracking database
    pub db_file: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_file_name(),
            max_retries: default_max_retries(),
            reset_stuck: default_reset_stuck(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: None,
            extensions: default_source_extensions(),
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: None,
            prefix: default_blob_prefix(),
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            dpi: default_converter_dpi(),
            pdftoppm: default_pdftoppm_path(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend_url: default_embedding_backend_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
        }
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            skip_duplicates: default_skip_duplicates(),
            resume_failed: default_resume_failed(),
            collaborator_timeout_secs: default_collaborator_timeout(),
        }
    }
}

impl Config {
    /// Get the default base directory for docflow (~/.docflow)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docflow")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join(&self.tracking.db_file),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join(&config.tracking.db_file),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.init_paths(Some(config.paths.base_dir.clone()));
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from the configured environment variable
    pub fn qdrant_api_key(&self) -> Option<String> {
        if self.qdrant.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.qdrant.api_key_env).ok()
    }

    /// Directory acting as the blob container
    pub fn blob_root(&self) -> PathBuf {
        self.blob
            .root
            .clone()
            .unwrap_or_else(|| self.paths.base_dir.join("blobs"))
    }

    /// Check if docflow is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tracking.max_retries < 0 {
            return Err(Error::Config(
                "tracking.max_retries must be >= 0".to_string(),
            ));
        }

        if self.processing.batch_size == 0 {
            return Err(Error::Config(
                "processing.batch_size must be positive".to_string(),
            ));
        }

        if self.processing.concurrency == 0 {
            return Err(Error::Config(
                "processing.concurrency must be positive".to_string(),
            ));
        }

        if self.processing.collaborator_timeout_secs == 0 {
            return Err(Error::Config(
                "processing.collaborator_timeout_secs must be positive".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if let Some(bad) = self
            .source
            .extensions
            .iter()
            .find(|ext| !ext.starts_with('.'))
        {
            return Err(Error::Config(format!(
                "source.extensions entries must start with '.': {}",
                bad
            )));
        }

        if !(36..=1200).contains(&self.converter.dpi) {
            return Err(Error::Config(
                "converter.dpi must be between 36 and 1200".to_string(),
            ));
        }

        Ok(())
    }
}
