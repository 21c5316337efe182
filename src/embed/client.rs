use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendCapabilities {
    #[serde(default)]
    pub backend_version: Option<String>,
    #[serde(default)]
    pub models: Vec<BackendModelCapabilities>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendModelCapabilities {
    #[serde(alias = "model")]
    pub id: String,
    #[serde(default)]
    pub modalities: Vec<String>,
    #[serde(default, alias = "embedding_dim", alias = "dimension")]
    pub embedding_dim: Option<usize>,
    #[serde(default)]
    pub multivector: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInput {
    pub image_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_mime: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct EmbedImageRequest {
    model: String,
    inputs: Vec<ImageInput>,
}

/// One input's output: a single vector or a set of patch vectors
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ImageEmbeddingOutput {
    Single(Vec<f32>),
    Multi(Vec<Vec<f32>>),
}

impl ImageEmbeddingOutput {
    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            ImageEmbeddingOutput::Single(v) => vec![v],
            ImageEmbeddingOutput::Multi(vs) => vs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Embeddings {
        embeddings: Vec<ImageEmbeddingOutput>,
    },
    Vectors {
        vectors: Vec<ImageEmbeddingOutput>,
    },
    Data {
        data: Vec<EmbeddingData>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: ImageEmbeddingOutput,
}

impl EmbeddingResponse {
    fn into_outputs(self) -> Vec<ImageEmbeddingOutput> {
        match self {
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Vectors { vectors } => vectors,
            EmbeddingResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

/// Thin client for the embedding backend's HTTP API
pub struct EmbeddingBackendClient {
    client: Client,
    base_url: Url,
    retries: usize,
    backoff: Duration,
}

impl EmbeddingBackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            retries: 2,
            backoff: Duration::from_millis(200),
        })
    }

    /// Override retry count and base backoff
    pub fn with_retries(mut self, retries: usize, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid embedding backend URL: {}", e)))
    }

    async fn send_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request
                .try_clone()
                .ok_or_else(|| Error::Model("Failed to clone backend request".to_string()))?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => {
                        return ok
                            .json::<T>()
                            .await
                            .map_err(|e| Error::Model(format!("Invalid backend response: {}", e)))
                    }
                    Err(e) => last_err = Some(Error::Model(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Model(e.to_string())),
            }

            if attempt < self.retries {
                debug!("Embedding request failed (attempt {}), retrying", attempt + 1);
                tokio::time::sleep(self.backoff * (attempt + 1) as u32).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Model("Embedding backend request failed".to_string())))
    }

    pub async fn capabilities(&self) -> Result<BackendCapabilities> {
        let url = self.endpoint("/capabilities")?;
        let request = self.client.get(url);
        self.send_with_retry(request).await
    }

    /// Embed PNG images; one output per input, in order
    pub async fn embed_images(
        &self,
        model: &str,
        inputs: Vec<ImageInput>,
    ) -> Result<Vec<ImageEmbeddingOutput>> {
        let expected = inputs.len();
        let url = self.endpoint("/v1/embed/image")?;
        let request = EmbedImageRequest {
            model: model.to_string(),
            inputs,
        };
        let parsed: EmbeddingResponse = self
            .send_with_retry(self.client.post(url).json(&request))
            .await?;
        let outputs = parsed.into_outputs();
        if outputs.len() != expected {
            return Err(Error::Model(format!(
                "Backend returned {} embeddings for {} inputs",
                outputs.len(),
                expected
            )));
        }
        Ok(outputs)
    }
}
