//! Pinecone inference API embedding provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EmbeddingService, InputRole};
use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, Vector};

/// Request body for `POST /embed`.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    parameters: EmbedParameters,
    inputs: Vec<EmbedInput<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedParameters {
    input_type: InputRole,
    truncate: &'static str,
}

#[derive(Debug, Serialize)]
struct EmbedInput<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    values: Vec<f32>,
}

/// Embeds through Pinecone's hosted inference endpoint.
#[derive(Debug, Clone)]
pub struct PineconeEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
    model: String,
    dimension: usize,
}

impl PineconeEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            api_version: crate::models::DEFAULT_PINECONE_API_VERSION.to_string(),
            model: config.model.clone(),
            dimension: config.dimension as usize,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingService for PineconeEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], role: InputRole) -> Result<Vec<Vector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            parameters: EmbedParameters {
                input_type: role,
                truncate: "END",
            },
            inputs: texts.iter().map(|t| EmbedInput { text: t }).collect(),
        };

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else if e.is_connect() {
                    EmbeddingError::ConnectionError(e.to_string())
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError { status, body });
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        Ok(embed_response
            .data
            .into_iter()
            .map(|d| d.values)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::retry::Retryable;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            url: format!("{url}/"),
            dimension: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_base_url_trimming() {
        let embedder = PineconeEmbedder::new(&config("https://api.pinecone.io"), "k".into()).unwrap();
        assert_eq!(embedder.base_url(), "https://api.pinecone.io");
    }

    #[tokio::test]
    async fn test_embed_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(header("Api-Key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "model": "multilingual-e5-large",
                "parameters": {"input_type": "passage", "truncate": "END"},
                "inputs": [{"text": "title: Liver"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "multilingual-e5-large",
                "data": [{"values": [0.1, 0.2, 0.3]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = PineconeEmbedder::new(&config(&server.uri()), "secret".into()).unwrap();
        let vectors = embedder
            .embed(&["title: Liver".to_string()], InputRole::Passage)
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2, 0.3]]);
    }

    #[tokio::test]
    async fn test_missing_data_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(serde_json::json!({
                "parameters": {"input_type": "query"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"model": "m"})))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = PineconeEmbedder::new(&config(&server.uri()), "k".into()).unwrap();
        let vectors = embedder
            .embed(&["q".to_string()], InputRole::Query)
            .await
            .unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(serde_json::json!({"error": "slow down"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let embedder = PineconeEmbedder::new(&config(&server.uri()), "k".into()).unwrap();
        let err = embedder
            .embed(&["q".to_string()], InputRole::Query)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ServerError { status: 429, .. }));
        assert!(err.is_retryable());
    }
}
