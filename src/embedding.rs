use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{AppError, Result};

/// Maps a batch of texts to fixed-dimension vectors, one per input.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                AppError::ConfigError(format!("Failed to build embedding client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.api_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError(format!("Request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError(format!(
                "Provider returned HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let mut parsed: EmbeddingResponse = res
            .json()
            .await
            .map_err(|e| AppError::EmbeddingError(format!("Invalid response format: {}", e)))?;

        parsed.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        validate_batch(texts.len(), &vectors)?;

        debug!(
            model = %self.model,
            count = vectors.len(),
            dimension = vectors[0].len(),
            "Embedded texts"
        );
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Checks that a provider answered with one non-empty vector per input, all
/// of the same dimension.
pub fn validate_batch(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(AppError::EmbeddingError(format!(
            "Expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }

    if let Some(first) = vectors.first() {
        if first.is_empty() {
            return Err(AppError::EmbeddingError("Empty embedding vector".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(AppError::EmbeddingError(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                first.len(),
                bad.len()
            )));
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            api_url: format!("{}/v1/", server.uri()),
            api_key: "sk-test".to_string(),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn embeds_and_orders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server)).unwrap();
        let vectors = embedder
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(embedder.model_name(), "test-model");
    }

    #[tokio::test]
    async fn provider_error_is_embedding_kind() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server)).unwrap();
        let err = embedder.embed(&["text".to_string()]).await.unwrap_err();

        assert_eq!(err.kind(), "embedding");
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn slow_provider_hits_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"index": 0, "embedding": [1.0]}]}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            timeout: Duration::from_millis(200),
            ..config_for(&server)
        };
        let embedder = HttpEmbedder::new(&config).unwrap();
        let err = embedder.embed(&["text".to_string()]).await.unwrap_err();

        assert_eq!(err.kind(), "embedding");
        assert!(err.to_string().contains("Request failed"));
    }

    #[test]
    fn validate_batch_rejects_mismatches() {
        assert!(validate_batch(2, &[vec![1.0]]).is_err());
        assert!(validate_batch(2, &[vec![1.0, 0.0], vec![1.0]]).is_err());
        assert!(validate_batch(1, &[vec![]]).is_err());
        assert!(validate_batch(2, &[vec![1.0], vec![0.5]]).is_ok());
    }
}
