//! Embedding clients for turning documents and queries into vectors.
//!
//! [`EmbeddingService`] is the raw remote call; [`EmbeddingClient`] wraps a
//! service with validation and the transient-retry policy.

mod pinecone;
mod tei;

pub use pinecone::PineconeEmbedder;
pub use tei::TeiEmbedder;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, ConfigError, EmbeddingError};
use crate::models::{Credentials, EmbeddingConfig, EmbeddingProvider, PINECONE_API_KEY_ENV, Vector};
use crate::utils::retry::{RetryConfig, with_retry};

/// Role of the text being embedded.
///
/// Asymmetric models encode stored passages and search queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRole {
    /// Stored document content
    Passage,
    /// User search query
    Query,
}

impl std::fmt::Display for InputRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputRole::Passage => write!(f, "passage"),
            InputRole::Query => write!(f, "query"),
        }
    }
}

/// A remote embedding endpoint.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Model name sent with each request.
    fn model(&self) -> &str;

    /// Dimensionality of the vectors the model produces.
    fn dimension(&self) -> usize;

    /// Embed `texts` in one request. An empty result signals "no data".
    async fn embed(&self, texts: &[String], role: InputRole) -> Result<Vec<Vector>, EmbeddingError>;
}

/// Embeds single texts through an [`EmbeddingService`], retrying transient failures.
#[derive(Clone)]
pub struct EmbeddingClient {
    service: Arc<dyn EmbeddingService>,
    retry: RetryConfig,
}

impl EmbeddingClient {
    pub fn new(service: Arc<dyn EmbeddingService>, retry: RetryConfig) -> Self {
        Self { service, retry }
    }

    pub fn model(&self) -> &str {
        self.service.model()
    }

    pub fn dimension(&self) -> usize {
        self.service.dimension()
    }

    /// Embed `text`, retrying rate limits and transport errors up to the
    /// configured attempt count. Permanent errors return immediately.
    pub async fn embed(&self, text: &str, role: InputRole) -> Result<Vector, EmbeddingError> {
        with_retry(&self.retry, || self.embed_once(text, role))
            .await
            .into_result()
    }

    pub async fn embed_passage(&self, text: &str) -> Result<Vector, EmbeddingError> {
        self.embed(text, InputRole::Passage).await
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vector, EmbeddingError> {
        self.embed(text, InputRole::Query).await
    }

    /// One attempt, no retry. Validates that exactly one vector of the
    /// expected dimension came back.
    pub async fn embed_once(&self, text: &str, role: InputRole) -> Result<Vector, EmbeddingError> {
        let texts = [text.to_string()];
        let vector = self
            .service
            .embed(&texts, role)
            .await?
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(EmbeddingError::EmptyResponse)?;

        let expected = self.service.dimension();
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        debug!(model = self.service.model(), %role, "embedded text");
        Ok(vector)
    }
}

impl EmbeddingConfig {
    /// Retry policy for embedding calls.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_secs(self.max_delay_secs))
    }
}

/// Create the embedding service selected by configuration.
pub fn create_service(
    config: &EmbeddingConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn EmbeddingService>, AppError> {
    match config.provider {
        EmbeddingProvider::Pinecone => {
            let api_key = credentials
                .pinecone_api_key
                .clone()
                .ok_or_else(|| ConfigError::MissingCredential(PINECONE_API_KEY_ENV.to_string()))?;
            Ok(Arc::new(PineconeEmbedder::new(config, api_key)?))
        }
        EmbeddingProvider::Tei => Ok(Arc::new(TeiEmbedder::new(
            config,
            credentials.embedding_api_key.clone(),
        )?)),
    }
}

/// Create a retrying client for the configured service.
pub fn create_client(
    config: &EmbeddingConfig,
    credentials: &Credentials,
) -> Result<EmbeddingClient, AppError> {
    Ok(EmbeddingClient::new(
        create_service(config, credentials)?,
        config.retry_config(),
    ))
}
