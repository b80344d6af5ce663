//! In-process index used by tests and dry local runs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{IndexInfo, VectorIndex, cosine_similarity};
use crate::error::VectorStoreError;
use crate::models::{DEFAULT_FETCH_BATCH_SIZE, IndexEntry, IndexMatch};

#[derive(Default)]
struct State {
    dimension: Option<usize>,
    namespaces: HashMap<String, Vec<IndexEntry>>,
    fetch_batches: Vec<usize>,
    failing_upserts: HashMap<String, usize>,
    failing_queries: usize,
}

/// Cosine-ranked index held in memory, with call tracking and failure injection.
pub struct InMemoryIndex {
    name: String,
    fetch_batch_size: usize,
    state: Mutex<State>,
    upsert_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            state: Mutex::new(State::default()),
            upsert_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fetch_batch_size(mut self, size: usize) -> Self {
        self.fetch_batch_size = size.max(1);
        self
    }

    /// Start with an existing index of the given dimension.
    pub fn with_dimension(self, dimension: usize) -> Self {
        self.lock().dimension = Some(dimension);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an entry directly, bypassing failure injection and counters.
    pub fn insert(&self, entry: IndexEntry, namespace: &str) {
        let mut state = self.lock();
        Self::put(&mut state, entry, namespace);
    }

    /// Make the next `times` upserts of `id` fail with a transient error.
    pub fn fail_upserts(&self, id: &str, times: usize) {
        self.lock().failing_upserts.insert(id.to_string(), times);
    }

    /// Make the next `times` queries fail with a transient error.
    pub fn fail_queries(&self, times: usize) {
        self.lock().failing_queries = times;
    }

    pub fn get(&self, id: &str, namespace: &str) -> Option<IndexEntry> {
        self.lock()
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.iter().find(|e| e.id == id).cloned())
    }

    pub fn ids(&self, namespace: &str) -> Vec<String> {
        self.lock()
            .namespaces
            .get(namespace)
            .map(|entries| entries.iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Sizes of every id batch passed to `fetch_existing`, in call order.
    pub fn fetch_batches(&self) -> Vec<usize> {
        self.lock().fetch_batches.clone()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    fn put(state: &mut State, entry: IndexEntry, namespace: &str) {
        let entries = state.namespaces.entry(namespace.to_string()).or_default();
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    fn unavailable(what: &str) -> VectorStoreError {
        VectorStoreError::ServerError {
            status: 503,
            body: format!("{what} unavailable"),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_batch_limit(&self) -> usize {
        self.fetch_batch_size
    }

    async fn describe(&self) -> Result<Option<IndexInfo>, VectorStoreError> {
        Ok(self.lock().dimension.map(|dimension| IndexInfo {
            name: self.name.clone(),
            dimension,
            created: false,
        }))
    }

    async fn ensure_index(&self, dimension: usize) -> Result<IndexInfo, VectorStoreError> {
        let mut state = self.lock();
        let created = state.dimension.is_none();
        let dimension = *state.dimension.get_or_insert(dimension);
        Ok(IndexInfo {
            name: self.name.clone(),
            dimension,
            created,
        })
    }

    async fn fetch_existing(
        &self,
        ids: &[String],
        namespace: &str,
    ) -> Result<HashSet<String>, VectorStoreError> {
        let mut state = self.lock();
        if ids.len() > self.fetch_batch_size {
            return Err(VectorStoreError::FetchError(format!(
                "batch of {} ids exceeds limit {}",
                ids.len(),
                self.fetch_batch_size
            )));
        }
        state.fetch_batches.push(ids.len());

        let stored: HashSet<&str> = state
            .namespaces
            .get(namespace)
            .map(|entries| entries.iter().map(|e| e.id.as_str()).collect())
            .unwrap_or_default();

        Ok(ids
            .iter()
            .filter(|id| stored.contains(id.as_str()))
            .cloned()
            .collect())
    }

    async fn upsert(&self, entry: &IndexEntry, namespace: &str) -> Result<(), VectorStoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();

        if let Some(remaining) = state.failing_upserts.get_mut(&entry.id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Self::unavailable("upsert"));
        }

        if let Some(dimension) = state.dimension
            && dimension != entry.vector.len()
        {
            return Err(VectorStoreError::UpsertError(format!(
                "vector dimension {} does not match index dimension {}",
                entry.vector.len(),
                dimension
            )));
        }

        Self::put(&mut state, entry.clone(), namespace);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>, VectorStoreError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();

        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(Self::unavailable("query"));
        }

        let mut matches: Vec<IndexMatch> = state
            .namespaces
            .get(namespace)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| IndexMatch {
                        id: entry.id.clone(),
                        score: cosine_similarity(vector, &entry.vector),
                        document: if include_metadata {
                            entry.document.clone()
                        } else {
                            Default::default()
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn namespace_count(&self, namespace: &str) -> Result<u64, VectorStoreError> {
        Ok(self
            .lock()
            .namespaces
            .get(namespace)
            .map_or(0, |entries| entries.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
        let mut document = Document::new();
        document.insert("series_id", id);
        IndexEntry::new(id, vector, document)
    }

    #[tokio::test]
    async fn test_ensure_index_keeps_existing_dimension() {
        let index = InMemoryIndex::new("test").with_dimension(3);
        let info = index.ensure_index(8).await.unwrap();
        assert_eq!(info.dimension, 3);
        assert!(!info.created);

        let fresh = InMemoryIndex::new("fresh");
        assert!(fresh.describe().await.unwrap().is_none());
        assert!(fresh.ensure_index(4).await.unwrap().created);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_scopes_by_namespace() {
        let index = InMemoryIndex::new("test");
        index.upsert(&entry("A", vec![1.0, 0.0]), "ns1").await.unwrap();
        index.upsert(&entry("A", vec![0.0, 1.0]), "ns1").await.unwrap();
        index.upsert(&entry("B", vec![1.0, 0.0]), "ns2").await.unwrap();

        assert_eq!(index.namespace_count("ns1").await.unwrap(), 1);
        assert_eq!(index.get("A", "ns1").unwrap().vector, vec![0.0, 1.0]);
        let existing = index
            .fetch_existing(&["A".to_string(), "B".to_string()], "ns1")
            .await
            .unwrap();
        assert_eq!(existing, HashSet::from(["A".to_string()]));
    }

    #[tokio::test]
    async fn test_query_ranks_by_cosine() {
        let index = InMemoryIndex::new("test");
        index.insert(entry("far", vec![0.0, 1.0]), "ns1");
        index.insert(entry("near", vec![1.0, 0.1]), "ns1");
        index.insert(entry("mid", vec![1.0, 1.0]), "ns1");

        let matches = index.query(&[1.0, 0.0], 2, "ns1", true).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert_eq!(matches[0].document.get("series_id"), Some("near"));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let index = InMemoryIndex::new("test");
        index.fail_upserts("A", 1);
        assert!(index.upsert(&entry("A", vec![1.0]), "ns1").await.is_err());
        assert!(index.upsert(&entry("A", vec![1.0]), "ns1").await.is_ok());
        assert_eq!(index.upsert_calls(), 2);

        index.fail_queries(1);
        assert!(index.query(&[1.0], 1, "ns1", false).await.is_err());
        assert_eq!(index.query(&[1.0], 1, "ns1", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_batch() {
        let index = InMemoryIndex::new("test").with_fetch_batch_size(2);
        let ids: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert!(index.fetch_existing(&ids, "ns1").await.is_err());
        assert!(index.fetch_existing(&ids[..2], "ns1").await.is_ok());
        assert_eq!(index.fetch_batches(), vec![2]);
    }
}
