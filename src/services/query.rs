//! Free-text retrieval against an indexed namespace.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::error::AppError;
use crate::models::{Document, IndexMatch, SearchConfig, SearchResults};
use crate::services::embedding::{EmbeddingClient, InputRole};
use crate::services::vector_index::VectorIndex;
use crate::utils::{RetryConfig, with_retry_if};

impl SearchConfig {
    /// Whole-operation retry policy: fixed attempt count, doubling delay, no jitter.
    pub fn retry_config(&self) -> RetryConfig {
        let base = Duration::from_secs(self.base_delay_secs);
        let ceiling = base.saturating_mul(1u32 << self.max_attempts.min(16));
        RetryConfig::new(self.max_attempts)
            .with_initial_delay(base)
            .with_max_delay(ceiling)
            .with_jitter(false)
    }
}

/// Embeds a query and returns the closest stored documents.
pub struct QueryEngine {
    embedder: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
    namespace: String,
    retry: RetryConfig,
}

impl QueryEngine {
    pub fn new(
        embedder: EmbeddingClient,
        index: Arc<dyn VectorIndex>,
        namespace: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            namespace: namespace.into(),
            retry,
        }
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    /// Documents of the `top_k` nearest entries, best first.
    ///
    /// Never fails: once every attempt has failed the result is empty.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<Document> {
        self.retrieve_matches(query, top_k)
            .await
            .into_iter()
            .map(|m| m.document)
            .collect()
    }

    /// Like [`retrieve`](Self::retrieve) but keeps ids and scores.
    pub async fn retrieve_matches(&self, query: &str, top_k: usize) -> Vec<IndexMatch> {
        if query.trim().is_empty() || top_k == 0 {
            return Vec::new();
        }

        let result = with_retry_if(&self.retry, || self.attempt(query, top_k), |_| true)
            .await
            .into_result();

        match result {
            Ok(matches) => matches,
            Err(e) => {
                error!(
                    index = self.index.name(),
                    attempts = self.retry.max_retries,
                    error = %e,
                    "query failed, returning no results"
                );
                Vec::new()
            }
        }
    }

    /// Timed retrieval for display.
    pub async fn search(&self, query: &str, top_k: usize) -> SearchResults {
        let start = Instant::now();
        let matches = self.retrieve_matches(query, top_k).await;
        SearchResults::new(
            query.to_string(),
            matches,
            start.elapsed().as_millis() as u64,
        )
    }

    async fn attempt(&self, query: &str, top_k: usize) -> Result<Vec<IndexMatch>, AppError> {
        let vector = self.embedder.embed_once(query, InputRole::Query).await?;
        let matches = self
            .index
            .query(&vector, top_k, &self.namespace, true)
            .await?;
        debug!(results = matches.len(), top_k, "query answered");
        Ok(matches)
    }
}
