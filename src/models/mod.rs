mod config;
mod document;
mod record;
mod report;
mod search;

pub use config::{
    Config, Credentials, DATABASE_URL_ENV, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_FETCH_BATCH_SIZE, DEFAULT_FIELD_TRUNCATE_SIZE, DEFAULT_INDEX_NAME,
    DEFAULT_METADATA_TABLE, DEFAULT_NAMESPACE, DEFAULT_PINECONE_API_URL,
    DEFAULT_PINECONE_API_VERSION, DEFAULT_QDRANT_URL, DEFAULT_SIZE_BUDGET, DocumentConfig,
    EMBEDDING_API_KEY_ENV, EmbeddingConfig, EmbeddingProvider, IndexConfig, IndexDriver,
    MetadataConfig, PINECONE_API_KEY_ENV, QDRANT_API_KEY_ENV, SearchConfig,
};
pub use document::{Document, IndexEntry, Vector};
pub use record::MetadataRecord;
pub use report::{RunReport, Stage};
pub use search::{IndexMatch, OutputFormat, SearchResults};
