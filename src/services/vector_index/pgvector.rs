use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use super::{IndexInfo, VectorIndex};
use crate::error::VectorStoreError;
use crate::models::{Document, IndexConfig, IndexEntry, IndexMatch};

/// PostgreSQL table with a pgvector column, one row per `(namespace, id)`.
///
/// Metadata is kept in a `json` column, which preserves field order, and is
/// read back as text.
pub struct PgVectorIndex {
    pool: PgPool,
    name: String,
    table_name: String,
    fetch_batch_size: usize,
}

impl PgVectorIndex {
    pub async fn new(config: &IndexConfig, url: &str) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.timeout_secs))
            .connect(url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        let index = Self {
            pool,
            name: config.name.clone(),
            table_name: Self::table_name(&config.name),
            fetch_batch_size: config.fetch_batch_size,
        };

        index.check_pgvector_extension().await?;

        Ok(index)
    }

    /// Index names may contain dashes, table names here may not.
    pub fn table_name(index_name: &str) -> String {
        let sanitized: String = index_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.starts_with(|c: char| c.is_ascii_digit()) || sanitized.is_empty() {
            format!("idx_{}", sanitized)
        } else {
            sanitized
        }
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    fn parse_document(raw: Option<String>) -> Document {
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
            .map(Document::from_metadata)
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_batch_limit(&self) -> usize {
        self.fetch_batch_size
    }

    async fn describe(&self) -> Result<Option<IndexInfo>, VectorStoreError> {
        // atttypmod of a vector(n) column is n
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT atttypmod FROM pg_attribute WHERE attrelid = to_regclass($1) AND attname = 'embedding'",
        )
        .bind(&self.table_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(row.map(|(dimension,)| IndexInfo {
            name: self.name.clone(),
            dimension: dimension.max(0) as usize,
            created: false,
        }))
    }

    async fn ensure_index(&self, dimension: usize) -> Result<IndexInfo, VectorStoreError> {
        if let Some(info) = self.describe().await? {
            return Ok(info);
        }

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                namespace TEXT NOT NULL,
                id TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                metadata JSON NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (namespace, id)
            )
            "#,
            self.table_name, dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        let create_hnsw = format!(
            "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding vector_cosine_ops)",
            self.table_name, self.table_name
        );

        sqlx::query(&create_hnsw)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        Ok(IndexInfo {
            name: self.name.clone(),
            dimension,
            created: true,
        })
    }

    async fn fetch_existing(
        &self,
        ids: &[String],
        namespace: &str,
    ) -> Result<HashSet<String>, VectorStoreError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let query = format!(
            "SELECT id FROM {} WHERE namespace = $1 AND id = ANY($2)",
            self.table_name
        );

        let rows: Vec<(String,)> = sqlx::query_as(&query)
            .bind(namespace)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::FetchError(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn upsert(&self, entry: &IndexEntry, namespace: &str) -> Result<(), VectorStoreError> {
        let metadata = serde_json::to_string(&entry.document)
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        let query = format!(
            r#"
            INSERT INTO {} (namespace, id, embedding, metadata, updated_at)
            VALUES ($1, $2, $3, $4::json, now())
            ON CONFLICT (namespace, id) DO UPDATE SET
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata,
                updated_at = EXCLUDED.updated_at
            "#,
            self.table_name
        );

        let embedding = Vector::from(entry.vector.clone());

        sqlx::query(&query)
            .bind(namespace)
            .bind(&entry.id)
            .bind(&embedding)
            .bind(metadata)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>, VectorStoreError> {
        let embedding = Vector::from(vector.to_vec());
        let metadata_column = if include_metadata {
            "metadata::text"
        } else {
            "NULL::text"
        };

        let query = format!(
            r#"
            SELECT
                id,
                1 - (embedding <=> $1) AS score,
                {} AS metadata
            FROM {}
            WHERE namespace = $2
            ORDER BY embedding <=> $1
            LIMIT $3
            "#,
            metadata_column, self.table_name
        );

        let rows = sqlx::query(&query)
            .bind(&embedding)
            .bind(namespace)
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

        let matches = rows
            .into_iter()
            .map(|row: PgRow| {
                let id: String = row.get("id");
                let score: f64 = row.get("score");
                let metadata: Option<String> = row.get("metadata");
                IndexMatch {
                    id,
                    score: score as f32,
                    document: Self::parse_document(metadata),
                }
            })
            .collect();

        Ok(matches)
    }

    async fn namespace_count(&self, namespace: &str) -> Result<u64, VectorStoreError> {
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE namespace = $1",
            self.table_name
        );
        let row: (i64,) = sqlx::query_as(&query)
            .bind(namespace)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(row.0 as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_sanitized() {
        assert_eq!(PgVectorIndex::table_name("gse-index"), "gse_index");
        assert_eq!(PgVectorIndex::table_name("GEO.v2"), "geo_v2");
        assert_eq!(PgVectorIndex::table_name("2024"), "idx_2024");
    }

    #[test]
    fn test_parse_document_keeps_field_order() {
        let doc = PgVectorIndex::parse_document(Some(
            r#"{"title":"Liver","organism":"Mus musculus","n":3}"#.to_string(),
        ));
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["title", "organism", "n"]);
        assert_eq!(doc.get("n"), Some("3"));
        assert!(PgVectorIndex::parse_document(None).is_empty());
    }
}
