//! Determines which candidate ids are missing from the remote index.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::VectorStoreError;
use crate::services::vector_index::VectorIndex;
use crate::utils::{RetryConfig, with_retry};

pub struct IndexDiffer {
    index: Arc<dyn VectorIndex>,
    namespace: String,
    retry: RetryConfig,
}

impl IndexDiffer {
    pub fn new(index: Arc<dyn VectorIndex>, namespace: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            index,
            namespace: namespace.into(),
            retry,
        }
    }

    /// Candidates not yet stored in the namespace, preserving candidate order.
    ///
    /// Ids are checked in batches no larger than the backend's fetch limit.
    /// A batch that keeps failing after retries fails the whole diff.
    pub async fn diff(&self, candidates: &[String]) -> Result<Vec<String>, VectorStoreError> {
        let batch_size = self.index.fetch_batch_limit().max(1);
        let mut existing: HashSet<String> = HashSet::new();

        for (batch_no, batch) in candidates.chunks(batch_size).enumerate() {
            let found = with_retry(&self.retry, || {
                self.index.fetch_existing(batch, &self.namespace)
            })
            .await
            .into_result()?;

            debug!(
                batch = batch_no,
                size = batch.len(),
                existing = found.len(),
                "fetched existing ids"
            );
            existing.extend(found);
        }

        Ok(candidates
            .iter()
            .filter(|id| !existing.contains(id.as_str()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{Document, IndexEntry};
    use crate::services::vector_index::InMemoryIndex;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn retry() -> RetryConfig {
        RetryConfig::new(3).with_initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_diff_returns_missing_ids() {
        let index = Arc::new(InMemoryIndex::new("test"));
        index.insert(IndexEntry::new("B", vec![1.0], Document::new()), "ns1");

        let differ = IndexDiffer::new(index, "ns1", retry());
        let new_ids = differ.diff(&ids(&["A", "B", "C"])).await.unwrap();
        assert_eq!(new_ids, ids(&["A", "C"]));
    }

    #[tokio::test]
    async fn test_empty_index_means_all_new() {
        let index = Arc::new(InMemoryIndex::new("test"));
        let differ = IndexDiffer::new(index, "ns1", retry());
        let candidates = ids(&["GSE1", "GSE2"]);
        assert_eq!(differ.diff(&candidates).await.unwrap(), candidates);
    }

    #[tokio::test]
    async fn test_all_present_means_none_new() {
        let index = Arc::new(InMemoryIndex::new("test"));
        for id in ["A", "B"] {
            index.insert(IndexEntry::new(id, vec![1.0], Document::new()), "ns1");
        }
        let differ = IndexDiffer::new(index, "ns1", retry());
        assert!(differ.diff(&ids(&["A", "B"])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batches_respect_fetch_limit() {
        let index = Arc::new(InMemoryIndex::new("test").with_fetch_batch_size(2));
        index.insert(IndexEntry::new("E", vec![1.0], Document::new()), "ns1");

        let differ = IndexDiffer::new(index.clone(), "ns1", retry());
        let new_ids = differ.diff(&ids(&["A", "B", "C", "D", "E"])).await.unwrap();
        assert_eq!(new_ids, ids(&["A", "B", "C", "D"]));
        assert_eq!(index.fetch_batches(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_other_namespace_is_ignored() {
        let index = Arc::new(InMemoryIndex::new("test"));
        index.insert(IndexEntry::new("A", vec![1.0], Document::new()), "ns2");
        let differ = IndexDiffer::new(index, "ns1", retry());
        assert_eq!(differ.diff(&ids(&["A"])).await.unwrap(), ids(&["A"]));
    }
}
