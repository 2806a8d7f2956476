//! Client for a text-embeddings-inference compatible embedding server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Embedder, check_dimensions};
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Health response from the /health endpoint.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    batch_size: usize,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1) as usize,
            dimension: config.dimension as usize,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query `/health`. An empty 200 body counts as healthy.
    pub async fn health(&self) -> Result<HealthResponse, EmbeddingError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(EmbeddingError::ServerError(format!(
                "health check failed with status: {}",
                response.status()
            )));
        }

        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or(HealthResponse {
            status: Some("healthy".to_string()),
            model_id: None,
        }))
    }

    async fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            inputs: texts,
            truncate: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        check_dimensions(&embed_response.0, texts.len(), self.dimension)?;
        Ok(embed_response.0)
    }
}

fn map_send_error(e: reqwest::Error) -> EmbeddingError {
    if e.is_timeout() {
        EmbeddingError::Timeout
    } else if e.is_connect() {
        EmbeddingError::ModelUnavailable(e.to_string())
    } else {
        EmbeddingError::RequestError(e)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            all_embeddings.extend(self.embed_single_batch(chunk).await?);
        }

        debug!(count = all_embeddings.len(), "embedded batch");
        Ok(all_embeddings)
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        self.health().await.map(|_| ())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(url: &str, dimension: u32, batch_size: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            url: url.to_string(),
            dimension,
            batch_size,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_base_url_trimming() {
        let embedder = HttpEmbedder::new(&config_for("http://localhost:8080/", 4, 8)).unwrap();
        assert_eq!(embedder.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_embed_posts_inputs_and_parses_vectors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(serde_json::json!({
                "inputs": ["hello world"],
                "truncate": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![vec![0.1f32, 0.2, 0.3]]))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server.uri(), 3, 8)).unwrap();
        let vector = embedder.embed("hello world").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_batch_splits_by_batch_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(serde_json::json!({ "inputs": ["a", "b"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![vec![1.0f32, 0.0], vec![0.0, 1.0]]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(serde_json::json!({ "inputs": ["c"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![vec![0.5f32, 0.5]]))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server.uri(), 2, 2)).unwrap();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[2], vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![vec![0.1f32, 0.2]]))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server.uri(), 768, 8)).unwrap();
        let err = embedder.embed("text").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server.uri(), 3, 8)).unwrap();
        let err = embedder.embed("text").await.unwrap_err();
        match err {
            EmbeddingError::ServerError(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_model_unavailable() {
        // Port 9 (discard) is closed on test machines.
        let embedder = HttpEmbedder::new(&config_for("http://127.0.0.1:9", 3, 8)).unwrap();
        let err = embedder.embed("text").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_health_accepts_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server.uri(), 3, 8)).unwrap();
        let health = embedder.health().await.unwrap();
        assert_eq!(health.status.as_deref(), Some("healthy"));
        assert!(embedder.health_check().await.is_ok());
    }
}
