//! Error types for the GEO indexing pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Returns true for HTTP statuses worth retrying (rate limiting, server side trouble).
fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding service: {0}")]
    ConnectionError(String),

    #[error("embedding service returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding service returned no data")]
    EmptyResponse,

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            // 429 Too Many Requests and 5xx are transient; auth and validation failures are not
            EmbeddingError::ServerError { status, .. } => is_transient_status(*status),
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::EmptyResponse
            | EmbeddingError::DimensionMismatch { .. } => false,
        }
    }
}

/// Errors related to vector index operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector index: {0}")]
    ConnectionError(String),

    #[error("vector index returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("index error: {0}")]
    IndexError(String),

    #[error("index {0} did not become ready in time")]
    NotReady(String),

    #[error("fetch error: {0}")]
    FetchError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("invalid response from vector index: {0}")]
    InvalidResponse(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),
}

impl From<reqwest::Error> for VectorStoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            VectorStoreError::ConnectionError(e.to_string())
        } else {
            VectorStoreError::InvalidResponse(e.to_string())
        }
    }
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionError(_) => true,
            VectorStoreError::ServerError { status, .. } => is_transient_status(*status),
            VectorStoreError::InvalidResponse(_)
            | VectorStoreError::NotReady(_)
            | VectorStoreError::PgVectorExtensionError(_) => false,
            VectorStoreError::IndexError(msg)
            | VectorStoreError::FetchError(msg)
            | VectorStoreError::UpsertError(msg)
            | VectorStoreError::QueryError(msg)
            | VectorStoreError::PostgresError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("timed out")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
        }
    }
}

/// Errors related to reading the relational metadata store.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata database not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid table name: {0}")]
    InvalidTable(String),

    #[error("table {0} has no columns")]
    NoColumns(String),
}

/// Errors related to configuration. All of these are fatal before processing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error(
        "embedding model produces {model_dimension}-dimensional vectors but index {index} was created with dimension {index_dimension}"
    )]
    DimensionMismatch {
        index: String,
        model_dimension: usize,
        index_dimension: usize,
    },
}

/// Errors that abort a pipeline run.
///
/// Per-record embedding and upsert failures are not represented here: they are
/// counted in the run report and the run continues.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("vector index error: {0}")]
    Index(#[from] VectorStoreError),

    #[error("metadata loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector index error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_classification() {
        let rate_limited = EmbeddingError::ServerError {
            status: 429,
            body: "Too Many Requests".to_string(),
        };
        assert!(rate_limited.is_retryable());

        let unavailable = EmbeddingError::ServerError {
            status: 503,
            body: String::new(),
        };
        assert!(unavailable.is_retryable());

        let unauthorized = EmbeddingError::ServerError {
            status: 401,
            body: "invalid api key".to_string(),
        };
        assert!(!unauthorized.is_retryable());

        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(!EmbeddingError::EmptyResponse.is_retryable());
        assert!(
            !EmbeddingError::DimensionMismatch {
                expected: 1024,
                actual: 768
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_vector_store_error_classification() {
        assert!(VectorStoreError::ConnectionError("refused".to_string()).is_retryable());
        assert!(VectorStoreError::UpsertError("request timed out".to_string()).is_retryable());
        assert!(!VectorStoreError::UpsertError("bad vector".to_string()).is_retryable());
        assert!(
            VectorStoreError::ServerError {
                status: 502,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !VectorStoreError::ServerError {
                status: 400,
                body: "dimension".to_string()
            }
            .is_retryable()
        );
    }
}
