//! Document sources
//!
//! A source enumerates candidate documents and copies them into a local
//! working directory. The pipeline only ever reads local copies.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A document as listed by a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// File name without directories
    pub name: String,
    /// Source-specific path, passed back to [`DocumentSource::download`]
    pub path: String,
    pub size: u64,
    /// RFC3339 modification time, when the source knows it
    pub modified_at: Option<String>,
}

impl SourceFile {
    /// Lowercase extension without the dot (`pdf`, `png`, ...)
    pub fn file_type(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Guessed MIME type
    pub fn content_type(&self) -> Option<String> {
        mime_guess::from_path(&self.name)
            .first()
            .map(|m| m.essence_str().to_string())
    }
}

/// Where documents come from
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// List documents under `path` whose extension is in `extensions`
    /// (leading dot, case-insensitive). An empty filter lists everything.
    async fn list(&self, path: &str, extensions: &[String]) -> Result<Vec<SourceFile>>;

    /// Copy one document to `dest`, returning the number of bytes written
    async fn download(&self, path: &str, dest: &Path) -> Result<u64>;
}

/// A directory tree on the local filesystem
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn map_io(err: std::io::Error, path: &Path) -> Error {
    match err.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
        _ => Error::SourceUnavailable(format!("{}: {}", path.display(), err)),
    }
}

#[async_trait]
impl DocumentSource for LocalDirSource {
    async fn list(&self, path: &str, extensions: &[String]) -> Result<Vec<SourceFile>> {
        let dir = self.resolve(path);
        if !dir.exists() {
            return Err(Error::NotFound(dir.display().to_string()));
        }
        if !dir.is_dir() {
            return Err(Error::SourceUnavailable(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let extensions = extensions.to_vec();
        let files = tokio::task::spawn_blocking(move || {
            let walker = WalkBuilder::new(&dir)
                .hidden(false)
                .git_ignore(true)
                .git_exclude(true)
                .sort_by_file_path(|a, b| a.cmp(b))
                .build();

            let mut files = Vec::new();
            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let path = entry.path();
                if !matches_extension(path, &extensions) {
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("Skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                let modified_at = metadata
                    .modified()
                    .ok()
                    .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

                files.push(SourceFile {
                    name: entry.file_name().to_string_lossy().to_string(),
                    path: path.display().to_string(),
                    size: metadata.len(),
                    modified_at,
                });
            }
            files
        })
        .await
        .map_err(|e| Error::SourceUnavailable(format!("Listing task failed: {}", e)))?;

        debug!("Listed {} file(s) under {}", files.len(), path);
        Ok(files)
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<u64> {
        let src = self.resolve(path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let written = tokio::fs::copy(&src, dest)
            .await
            .map_err(|e| map_io(e, &src))?;
        debug!("Downloaded {} ({} bytes)", src.display(), written);
        Ok(written)
    }
}
