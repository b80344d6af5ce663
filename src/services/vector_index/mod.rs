//! Vector index abstraction layer.
//!
//! This module provides a trait-based abstraction over the remote index
//! backends (Pinecone, Qdrant, PostgreSQL/pgvector) so the pipeline and the
//! query engine never depend on a concrete service.

mod memory;
mod pgvector;
mod pinecone;
mod qdrant;

pub use memory::InMemoryIndex;
pub use pgvector::PgVectorIndex;
pub use pinecone::PineconeIndex;
pub use qdrant::QdrantIndex;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, ConfigError, VectorStoreError};
use crate::models::{
    Credentials, DATABASE_URL_ENV, DEFAULT_FETCH_BATCH_SIZE, IndexConfig, IndexDriver, IndexEntry,
    IndexMatch, PINECONE_API_KEY_ENV,
};

/// Index information reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub dimension: usize,
    /// True when `ensure_index` created the index during this call.
    pub created: bool,
}

/// Operations the pipeline needs from a remote vector index.
///
/// Every data operation is scoped to a namespace. Upserts are idempotent:
/// writing an existing id replaces its vector and metadata.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Name of the index (Pinecone index, Qdrant collection, PostgreSQL table).
    fn name(&self) -> &str;

    /// Largest id batch a single existence fetch accepts.
    fn fetch_batch_limit(&self) -> usize {
        DEFAULT_FETCH_BATCH_SIZE
    }

    /// Describe the index, or `None` if it does not exist.
    async fn describe(&self) -> Result<Option<IndexInfo>, VectorStoreError>;

    /// Create the index with cosine similarity if absent and wait until it is usable.
    async fn ensure_index(&self, dimension: usize) -> Result<IndexInfo, VectorStoreError>;

    /// Return the subset of `ids` already stored in `namespace`.
    async fn fetch_existing(
        &self,
        ids: &[String],
        namespace: &str,
    ) -> Result<HashSet<String>, VectorStoreError>;

    /// Insert or replace one entry.
    async fn upsert(&self, entry: &IndexEntry, namespace: &str) -> Result<(), VectorStoreError>;

    /// Nearest neighbours of `vector` by cosine similarity, best first. Raw
    /// vectors are never returned.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>, VectorStoreError>;

    /// Number of entries stored in `namespace`.
    async fn namespace_count(&self, namespace: &str) -> Result<u64, VectorStoreError>;
}

/// Create a vector index backend based on configuration.
pub async fn create_backend(
    config: &IndexConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn VectorIndex>, AppError> {
    let url = config.resolved_url(credentials);

    match config.driver {
        IndexDriver::Pinecone => {
            let api_key = credentials
                .pinecone_api_key
                .clone()
                .ok_or_else(|| ConfigError::MissingCredential(PINECONE_API_KEY_ENV.to_string()))?;
            let backend = PineconeIndex::new(config, url.unwrap_or_default(), api_key)?;
            Ok(Arc::new(backend))
        }
        IndexDriver::Qdrant => {
            let backend = QdrantIndex::new(
                config,
                &url.unwrap_or_default(),
                credentials.qdrant_api_key.clone(),
            )?;
            Ok(Arc::new(backend))
        }
        IndexDriver::PostgreSQL => {
            let url = url
                .ok_or_else(|| ConfigError::MissingCredential(DATABASE_URL_ENV.to_string()))?;
            let backend = PgVectorIndex::new(config, &url).await?;
            Ok(Arc::new(backend))
        }
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 when either is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
