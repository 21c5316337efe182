//! Durable blob storage for uploaded originals

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Object storage for original documents
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `local` under `name`, returning a URL for the stored blob
    async fn upload(&self, local: &Path, name: &str) -> Result<String>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Remove a blob. Removing a missing blob is not an error.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Blob name for a tracked file: `{prefix}/{file_id}_{file_name}`
pub fn blob_name(prefix: &str, file_id: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}_{}", file_id, file_name)
    } else {
        format!("{}/{}_{}", prefix, file_id, file_name)
    }
}

/// A local directory used as a blob container
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a blob name onto the container, refusing names that escape it
    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let safe = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::Storage(format!("Invalid blob name: {}", name)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, local: &Path, name: &str) -> Result<String> {
        let target = self.blob_path(name)?;
        let parent = target
            .parent()
            .ok_or_else(|| Error::Storage(format!("Invalid blob name: {}", name)))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;

        // Stage beside the target and rename into place
        let staging = parent.join(format!(".{}.partial", Uuid::new_v4()));
        if let Err(e) = tokio::fs::copy(local, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(Error::Storage(format!(
                "Failed to upload {}: {}",
                local.display(),
                e
            )));
        }
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit blob {}: {}", name, e)))?;

        let absolute = std::path::absolute(&target)
            .map_err(|e| Error::Storage(format!("Failed to resolve blob path: {}", e)))?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| Error::Storage(format!("Blob path is not absolute: {}", absolute.display())))?;
        debug!("Uploaded {} -> {}", local.display(), url);
        Ok(url.to_string())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let target = self.blob_path(name)?;
        tokio::fs::try_exists(&target)
            .await
            .map_err(|e| Error::Storage(format!("Failed to stat blob {}: {}", name, e)))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let target = self.blob_path(name)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                debug!("Deleted blob {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to delete blob {}: {}", name, e))),
        }
    }
}
