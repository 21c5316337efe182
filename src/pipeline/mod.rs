//! Document processing pipeline
//!
//! - [`StageRunner`] moves one file through upload, conversion and
//!   embedding, persisting a status transition after every stage
//! - [`BatchCoordinator`] drives many files, isolating failures and
//!   resuming interrupted work

mod batch;
mod stage;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::*;
pub use stage::*;

use crate::blob::FsBlobStore;
use crate::config::Config;
use crate::convert::PageRenderer;
use crate::embed::HttpEmbedder;
use crate::error::Result;
use crate::source::LocalDirSource;
use crate::store::QdrantStore;
use crate::tracking::TrackingStore;
use std::sync::Arc;
use std::time::Duration;

/// Wire the reference collaborators from configuration.
///
/// `source_root` is the directory files are listed from; relative paths
/// handed to the source resolve against it.
pub async fn build_coordinator(
    config: &Config,
    store: TrackingStore,
    source_root: &std::path::Path,
) -> Result<BatchCoordinator> {
    let timeout = Duration::from_secs(config.processing.collaborator_timeout_secs);

    let vectors = QdrantStore::connect(config).await?;
    vectors.ensure_collection().await?;

    let collaborators = Collaborators {
        blobs: Arc::new(FsBlobStore::new(config.blob_root())),
        converter: Arc::new(PageRenderer::new(
            config.converter.dpi,
            config.converter.pdftoppm.clone(),
        )),
        embedder: Arc::new(HttpEmbedder::new(&config.embedding, timeout)?),
        vectors: Arc::new(vectors),
    };

    let runner = StageRunner::new(
        store.clone(),
        collaborators,
        config.blob.prefix.clone(),
        timeout,
    );
    let source = Arc::new(LocalDirSource::new(source_root));

    Ok(BatchCoordinator::new(store, source, runner))
}
