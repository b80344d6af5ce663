//! Single-entry upserts into the remote index.

use std::sync::Arc;

use tracing::debug;

use crate::error::VectorStoreError;
use crate::models::IndexEntry;
use crate::services::vector_index::VectorIndex;
use crate::utils::{RetryConfig, with_retry};

pub struct IndexWriter {
    index: Arc<dyn VectorIndex>,
    namespace: String,
    retry: RetryConfig,
}

impl IndexWriter {
    pub fn new(index: Arc<dyn VectorIndex>, namespace: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            index,
            namespace: namespace.into(),
            retry,
        }
    }

    /// Insert or fully replace `entry`, retrying transient failures.
    pub async fn write(&self, entry: &IndexEntry) -> Result<(), VectorStoreError> {
        with_retry(&self.retry, || self.index.upsert(entry, &self.namespace))
            .await
            .into_result()?;

        debug!(id = %entry.id, namespace = %self.namespace, "upserted entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::Document;
    use crate::services::vector_index::InMemoryIndex;

    fn entry(id: &str) -> IndexEntry {
        let mut document = Document::new();
        document.insert("title", "Liver atlas");
        IndexEntry::new(id, vec![0.5, 0.5], document)
    }

    fn writer(index: Arc<InMemoryIndex>) -> IndexWriter {
        IndexWriter::new(
            index,
            "ns1",
            RetryConfig::new(3).with_initial_delay(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_write_stores_entry() {
        let index = Arc::new(InMemoryIndex::new("test"));
        writer(index.clone()).write(&entry("GSE1")).await.unwrap();
        let stored = index.get("GSE1", "ns1").unwrap();
        assert_eq!(stored.document.get("title"), Some("Liver atlas"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let index = Arc::new(InMemoryIndex::new("test"));
        index.fail_upserts("GSE1", 2);
        writer(index.clone()).write(&entry("GSE1")).await.unwrap();
        assert_eq!(index.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_returned() {
        let index = Arc::new(InMemoryIndex::new("test"));
        index.fail_upserts("GSE1", 10);
        assert!(writer(index.clone()).write(&entry("GSE1")).await.is_err());
        assert_eq!(index.upsert_calls(), 3);
        assert!(index.get("GSE1", "ns1").is_none());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let index = Arc::new(InMemoryIndex::new("test").with_dimension(3));
        assert!(writer(index.clone()).write(&entry("GSE1")).await.is_err());
        assert_eq!(index.upsert_calls(), 1);
    }
}
