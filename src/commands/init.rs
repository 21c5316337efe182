//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tracking::TrackingStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Where `init` put things
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitReport {
    pub config_path: String,
    pub db_path: String,
    pub blob_root: String,
}

/// Write a default config and create the tracking database and blob root.
///
/// An existing config is kept unless `force` is set.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitReport> {
    let mut config = Config::load_from(base_dir)?;

    if config.paths.config_file.exists() {
        if !force {
            return Err(Error::Config(format!(
                "Config already exists at {}. Use --force to overwrite.",
                config.paths.config_file.display()
            )));
        }
        // Overwrite with defaults, keeping the resolved paths
        let paths = config.paths.clone();
        config = Config::default();
        config.paths = paths;
    }

    std::fs::create_dir_all(&config.paths.base_dir)?;
    config.save()?;

    let blob_root = config.blob_root();
    std::fs::create_dir_all(&blob_root)?;

    let store = TrackingStore::connect(&config).await?;
    if !store.is_initialized().await? {
        store.init_schema().await?;
    }

    info!("Initialized docflow at {:?}", config.paths.base_dir);

    Ok(InitReport {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        blob_root: blob_root.display().to_string(),
    })
}
