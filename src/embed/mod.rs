//! Page embedding
//!
//! This module provides an abstraction over vision embedding models with:
//! - A trait for different embedding backends
//! - An HTTP embedding backend client
//! - Pooling of multi-vector (patch) outputs into one page vector

mod client;
mod http_backend;

pub use client::*;
pub use http_backend::*;

use crate::convert::PageImage;
use crate::error::Result;
use async_trait::async_trait;

/// Vector produced for one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageEmbedding {
    pub vector: Vec<f32>,
    pub dimension: usize,
    /// Number of tokens (image patches) the model consumed for this page
    pub token_count: usize,
}

/// Trait for page embedding providers.
///
/// Model loading and caching are the implementation's concern.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, page: &PageImage) -> Result<PageEmbedding>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Mean of equally sized vectors, L2-normalized
pub fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut sum = vec![0.0f32; first.len()];
    for vector in vectors {
        if vector.len() != sum.len() {
            return None;
        }
        for (acc, v) in sum.iter_mut().zip(vector) {
            *acc += v;
        }
    }
    let n = vectors.len() as f32;
    sum.iter_mut().for_each(|v| *v /= n);
    Some(normalize_embedding(&sum))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let v = normalize_embedding(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalize_embedding(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pool() {
        let pooled = mean_pool(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((pooled[0] - expected).abs() < 1e-6);
        assert!((pooled[1] - expected).abs() < 1e-6);

        assert!(mean_pool(&[]).is_none());
        assert!(mean_pool(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }
}
