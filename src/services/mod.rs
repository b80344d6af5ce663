mod differ;
mod document_builder;
pub mod embedding;
mod metadata_store;
mod pipeline;
mod query;
pub mod vector_index;
mod writer;

pub use differ::IndexDiffer;
pub use document_builder::{DocumentBuilder, ELLIPSIS};
pub use embedding::{EmbeddingClient, EmbeddingService, InputRole, create_client};
pub use metadata_store::{RecordSource, SqliteMetadataStore};
pub use pipeline::{Pipeline, RunOptions};
pub use query::QueryEngine;
pub use vector_index::{IndexInfo, InMemoryIndex, VectorIndex, create_backend};
pub use writer::IndexWriter;
