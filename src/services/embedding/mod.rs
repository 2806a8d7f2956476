//! Embedding backends.
//!
//! Every backend maps cleaned text to a vector of the configured dimension.
//! Backends never retry; the ingestion job runner owns retries.

mod http;
mod onnx;

pub use http::{HealthResponse, HttpEmbedder};
pub use onnx::OnnxEmbedder;

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingProvider};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    /// Check that the backend can serve requests.
    async fn health_check(&self) -> Result<(), EmbeddingError>;

    fn dimension(&self) -> usize;

    /// Short human-readable description, e.g. the server URL or model path.
    fn describe(&self) -> String;
}

/// Build the embedder selected by configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::Http => Ok(Box::new(HttpEmbedder::new(config)?)),
        EmbeddingProvider::Onnx => Ok(Box::new(OnnxEmbedder::load(config)?)),
    }
}

/// Reject responses whose vectors do not match the configured dimension.
pub(crate) fn check_dimensions(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected_count,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected dimension {}, got {}",
            dimension,
            bad.len()
        )));
    }
    Ok(())
}

pub(crate) fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic embedders for pipeline tests.

    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Bag-of-words embedder: each lowercase word is hashed into one of
    /// `dimension` buckets and the result is L2-normalized. Identical texts
    /// get identical vectors.
    pub struct HashEmbedder {
        dimension: usize,
    }

    impl HashEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self { dimension }
        }

        pub fn vector_for(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; self.dimension];
            for word in text.split_whitespace() {
                let word = word.to_lowercase();
                let bucket = word
                    .bytes()
                    .fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
                v[bucket as usize % self.dimension] += 1.0;
            }
            normalize(&mut v);
            v
        }
    }

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }

        async fn health_check(&self) -> Result<(), EmbeddingError> {
            Ok(())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn describe(&self) -> String {
            "hash".to_string()
        }
    }

    /// Fails every call after the first `ok_calls` with a retryable error.
    pub struct FlakyEmbedder {
        inner: HashEmbedder,
        ok_calls: u32,
        calls: AtomicU32,
    }

    impl FlakyEmbedder {
        pub fn new(dimension: usize, ok_calls: u32) -> Self {
            Self {
                inner: HashEmbedder::new(dimension),
                ok_calls,
                calls: AtomicU32::new(0),
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.ok_calls {
                return Err(EmbeddingError::ModelUnavailable(
                    "connection refused".to_string(),
                ));
            }
            self.inner.embed_batch(texts).await
        }

        async fn health_check(&self) -> Result<(), EmbeddingError> {
            Err(EmbeddingError::ModelUnavailable("connection refused".to_string()))
        }

        fn dimension(&self) -> usize {
            self.inner.dimension
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }
}
