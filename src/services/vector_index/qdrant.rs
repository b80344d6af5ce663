//! Qdrant vector index backend implementation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, GetPointsBuilder,
    PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    vectors_config,
};
use uuid::Uuid;

use super::{IndexInfo, VectorIndex};
use crate::error::VectorStoreError;
use crate::models::{Document, IndexConfig, IndexEntry, IndexMatch};

const ENTRY_ID_FIELD: &str = "entry_id";
const NAMESPACE_FIELD: &str = "namespace";
const DOCUMENT_FIELD: &str = "document";

/// Qdrant collection holding every namespace, told apart by a payload field.
///
/// Point ids are UUIDv5 of `namespace:id`, so the same series id can live in
/// several namespaces and re-upserts hit the same point.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    fetch_batch_size: usize,
}

impl QdrantIndex {
    pub fn new(
        config: &IndexConfig,
        url: &str,
        api_key: Option<String>,
    ) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(url);

        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key);
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.name.clone(),
            fetch_batch_size: config.fetch_batch_size,
        })
    }

    pub fn point_id(namespace: &str, id: &str) -> String {
        let name = format!("{}:{}", namespace, id);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    fn namespace_filter(namespace: &str) -> Filter {
        Filter::must([Condition::matches(NAMESPACE_FIELD, namespace.to_string())])
    }

    fn point_uuid(id: Option<&PointId>) -> Option<&str> {
        match id.and_then(|id| id.point_id_options.as_ref()) {
            Some(PointIdOptions::Uuid(uuid)) => Some(uuid.as_str()),
            _ => None,
        }
    }

    fn string_field<'a>(
        payload: &'a HashMap<String, qdrant_client::qdrant::Value>,
        key: &str,
    ) -> Option<&'a str> {
        payload.get(key).and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.as_str()),
            _ => None,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    fn fetch_batch_limit(&self) -> usize {
        self.fetch_batch_size
    }

    async fn describe(&self) -> Result<Option<IndexInfo>, VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        if !exists {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        let dimension = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                vectors_config::Config::Params(params) => Some(params.size as usize),
                vectors_config::Config::ParamsMap(_) => None,
            })
            .ok_or_else(|| {
                VectorStoreError::InvalidResponse(format!(
                    "collection {} has no single unnamed vector",
                    self.collection
                ))
            })?;

        Ok(Some(IndexInfo {
            name: self.collection.clone(),
            dimension,
            created: false,
        }))
    }

    async fn ensure_index(&self, dimension: usize) -> Result<IndexInfo, VectorStoreError> {
        if let Some(info) = self.describe().await? {
            return Ok(info);
        }

        let create_collection = CreateCollectionBuilder::new(&self.collection).vectors_config(
            VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
        );

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        Ok(IndexInfo {
            name: self.collection.clone(),
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

        let by_point: HashMap<String, &String> = ids
            .iter()
            .map(|id| (Self::point_id(namespace, id), id))
            .collect();
        let point_ids: Vec<PointId> = by_point.keys().cloned().map(PointId::from).collect();

        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids)
                    .with_payload(false)
                    .with_vectors(false),
            )
            .await
            .map_err(|e| VectorStoreError::FetchError(e.to_string()))?;

        Ok(response
            .result
            .iter()
            .filter_map(|point| Self::point_uuid(point.id.as_ref()))
            .filter_map(|uuid| by_point.get(uuid).map(|id| (*id).clone()))
            .collect())
    }

    async fn upsert(&self, entry: &IndexEntry, namespace: &str) -> Result<(), VectorStoreError> {
        let document = serde_json::to_string(&entry.document)
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert(ENTRY_ID_FIELD.to_string(), entry.id.clone().into());
        payload.insert(NAMESPACE_FIELD.to_string(), namespace.to_string().into());
        payload.insert(DOCUMENT_FIELD.to_string(), document.into());

        let point = PointStruct::new(
            Self::point_id(namespace, &entry.id),
            entry.vector.clone(),
            payload,
        );
        let upsert = UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true);

        self.client
            .upsert_points(upsert)
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
        let search = SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
            .filter(Self::namespace_filter(namespace))
            .with_payload(true)
            .with_vectors(false);

        let results = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

        let matches = results
            .result
            .into_iter()
            .map(|point| {
                let id = Self::string_field(&point.payload, ENTRY_ID_FIELD)
                    .unwrap_or_default()
                    .to_string();
                let document = if include_metadata {
                    Self::string_field(&point.payload, DOCUMENT_FIELD)
                        .and_then(|raw| serde_json::from_str(raw).ok())
                        .map(Document::from_metadata)
                        .unwrap_or_default()
                } else {
                    Document::new()
                };
                IndexMatch {
                    id,
                    score: point.score,
                    document,
                }
            })
            .collect();

        Ok(matches)
    }

    async fn namespace_count(&self, namespace: &str) -> Result<u64, VectorStoreError> {
        let count = CountPointsBuilder::new(&self.collection)
            .filter(Self::namespace_filter(namespace))
            .exact(true);

        let response = self
            .client
            .count(count)
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

        Ok(response.result.map_or(0, |r| r.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable_per_namespace() {
        let a = QdrantIndex::point_id("ns1", "GSE1");
        assert_eq!(a.len(), 36);
        assert_eq!(a, QdrantIndex::point_id("ns1", "GSE1"));
        assert_ne!(a, QdrantIndex::point_id("ns2", "GSE1"));
        assert_ne!(a, QdrantIndex::point_id("ns1", "GSE2"));
    }

    #[test]
    fn test_new_builds_client_without_connecting() {
        let index = QdrantIndex::new(&IndexConfig::default(), "http://localhost:6334", None);
        assert!(index.is_ok());
        assert_eq!(index.unwrap().name(), "gse-index");
    }
}
