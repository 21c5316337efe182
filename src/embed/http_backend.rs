use super::{mean_pool, EmbeddingBackendClient, EmbeddingModel, ImageInput, PageEmbedding};
use crate::config::EmbeddingConfig;
use crate::convert::PageImage;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;

/// Embedding model served over HTTP
pub struct HttpEmbedder {
    client: EmbeddingBackendClient,
    model_id: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        let client = EmbeddingBackendClient::new(&config.backend_url, timeout)?;
        Ok(Self::with_client(client, &config.model, config.dimension))
    }

    pub fn with_client(client: EmbeddingBackendClient, model_id: &str, dimension: usize) -> Self {
        Self {
            client,
            model_id: model_id.to_string(),
            dimension,
        }
    }

    /// Confirm the backend serves the configured model at the configured dimension
    pub async fn verify_model(&self) -> Result<()> {
        let capabilities = self.client.capabilities().await?;
        let model = capabilities
            .models
            .iter()
            .find(|m| m.id == self.model_id)
            .ok_or_else(|| {
                Error::Model(format!(
                    "Embedding backend does not serve model '{}'",
                    self.model_id
                ))
            })?;

        if !model.modalities.is_empty() && !model.modalities.iter().any(|m| m == "image") {
            return Err(Error::Model(format!(
                "Model '{}' does not accept images",
                self.model_id
            )));
        }

        match model.embedding_dim {
            Some(dim) if dim != self.dimension => Err(Error::Model(format!(
                "Model '{}' produces {} dimensions, configured for {}",
                self.model_id, dim, self.dimension
            ))),
            _ => Ok(()),
        }
    }

    fn validate_dimensions(&self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(mismatch) = vectors.iter().find(|vec| vec.len() != self.dimension) {
            return Err(Error::Model(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model_id,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbedder {
    async fn embed(&self, page: &PageImage) -> Result<PageEmbedding> {
        let input = ImageInput {
            image_base64: STANDARD.encode(&page.bytes),
            image_mime: Some("image/png".to_string()),
        };

        let output = self
            .client
            .embed_images(&self.model_id, vec![input])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model("Backend returned no embedding".to_string()))?;

        let vectors = output.into_vectors();
        if vectors.is_empty() {
            return Err(Error::Model(format!(
                "Backend returned an empty embedding for page {}",
                page.page_number
            )));
        }
        self.validate_dimensions(&vectors)?;

        let token_count = vectors.len();
        let vector = mean_pool(&vectors)
            .ok_or_else(|| Error::Model("Failed to pool page embedding".to_string()))?;

        Ok(PageEmbedding {
            dimension: vector.len(),
            vector,
            token_count,
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
