//! Text Embeddings Inference compatible `/embed` provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EmbeddingService, InputRole};
use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, Vector};

/// Instruction type understood by the embedding server.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum InstructionType {
    Document,
    Query,
}

impl From<InputRole> for InstructionType {
    fn from(role: InputRole) -> Self {
        match role {
            InputRole::Passage => InstructionType::Document,
            InputRole::Query => InstructionType::Query,
        }
    }
}

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    inputs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
    instruction_type: InstructionType,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Client for a self-hosted embedding server.
#[derive(Debug, Clone)]
pub struct TeiEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl TeiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dimension: config.dimension as usize,
        })
    }

    /// Get the base URL of the embedding server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingService for TeiEmbedder {
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
            inputs: texts,
            truncate: Some(true),
            instruction_type: role.into(),
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout
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

        Ok(embed_response.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_base_url_trimming() {
        let config = EmbeddingConfig {
            url: "http://localhost:11411/".to_string(),
            ..Default::default()
        };
        let client = TeiEmbedder::new(&config, None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11411");
    }

    #[tokio::test]
    async fn test_query_uses_query_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(header("Authorization", "Bearer token"))
            .and(body_partial_json(serde_json::json!({
                "inputs": ["cancer"],
                "instruction_type": "query"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[0.5, 0.25]])))
            .expect(1)
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            url: server.uri(),
            dimension: 2,
            ..Default::default()
        };
        let client = TeiEmbedder::new(&config, Some("token".to_string())).unwrap();

        let vectors = client
            .embed(&["cancer".to_string()], InputRole::Query)
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.5, 0.25]]);
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .expect(1)
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            url: server.uri(),
            ..Default::default()
        };
        let client = TeiEmbedder::new(&config, None).unwrap();

        let err = client
            .embed(&["x".to_string()], InputRole::Passage)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ServerError { status: 503, .. }));
    }
}
