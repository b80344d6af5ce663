//! Pinecone serverless index backend over the REST API.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{IndexInfo, VectorIndex};
use crate::error::VectorStoreError;
use crate::models::{Document, IndexConfig, IndexEntry, IndexMatch};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    dimension: usize,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'static str,
    spec: IndexSpec<'a>,
}

#[derive(Debug, Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: [UpsertVector<'a>; 1],
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Document,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_values: bool,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct IndexStats {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: u64,
}

/// Pinecone index addressed through the control plane and its data-plane host.
pub struct PineconeIndex {
    client: Client,
    controller_url: String,
    api_key: String,
    api_version: String,
    name: String,
    cloud: String,
    region: String,
    fetch_batch_size: usize,
    ready_timeout: Duration,
    host: OnceCell<String>,
}

impl PineconeIndex {
    pub fn new(
        config: &IndexConfig,
        controller_url: String,
        api_key: String,
    ) -> Result<Self, VectorStoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: config.api_version.clone(),
            name: config.name.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            fetch_batch_size: config.fetch_batch_size,
            ready_timeout: Duration::from_secs(config.ready_timeout_secs),
            host: OnceCell::new(),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
    }

    async fn check(response: Response) -> Result<Response, VectorStoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(VectorStoreError::ServerError { status, body })
    }

    async fn describe_raw(&self) -> Result<Option<IndexDescription>, VectorStoreError> {
        let url = format!("{}/indexes/{}", self.controller_url, self.name);
        let response = self.request(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let description = Self::check(response)
            .await?
            .json::<IndexDescription>()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;
        Ok(Some(description))
    }

    async fn create(&self, dimension: usize) -> Result<(), VectorStoreError> {
        let url = format!("{}/indexes", self.controller_url);
        let body = CreateIndexRequest {
            name: &self.name,
            dimension,
            metric: "cosine",
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };

        let response = self.request(self.client.post(&url)).json(&body).send().await?;
        // 409: created concurrently by another run
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<IndexDescription, VectorStoreError> {
        let start = Instant::now();
        loop {
            if let Some(description) = self.describe_raw().await?
                && description.status.ready
            {
                return Ok(description);
            }
            if start.elapsed() >= self.ready_timeout {
                return Err(VectorStoreError::NotReady(self.name.clone()));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Data-plane base URL, resolved once from the index description.
    async fn host(&self) -> Result<&str, VectorStoreError> {
        self.host
            .get_or_try_init(|| async {
                let description = self
                    .describe_raw()
                    .await?
                    .ok_or_else(|| {
                        VectorStoreError::IndexError(format!("index {} not found", self.name))
                    })?;
                Ok::<_, VectorStoreError>(normalize_host(&description.host))
            })
            .await
            .map(String::as_str)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_batch_limit(&self) -> usize {
        self.fetch_batch_size
    }

    async fn describe(&self) -> Result<Option<IndexInfo>, VectorStoreError> {
        Ok(self.describe_raw().await?.map(|d| IndexInfo {
            name: d.name,
            dimension: d.dimension,
            created: false,
        }))
    }

    async fn ensure_index(&self, dimension: usize) -> Result<IndexInfo, VectorStoreError> {
        let mut created = false;
        let description = match self.describe_raw().await? {
            Some(d) if d.status.ready => d,
            Some(d) => {
                debug!(index = %self.name, state = ?d.status.state, "waiting for index");
                self.wait_until_ready().await?
            }
            None => {
                info!(index = %self.name, dimension, cloud = %self.cloud, region = %self.region, "creating index");
                self.create(dimension).await?;
                created = true;
                self.wait_until_ready().await?
            }
        };

        let _ = self.host.set(normalize_host(&description.host));

        Ok(IndexInfo {
            name: description.name,
            dimension: description.dimension,
            created,
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

        let url = format!("{}/vectors/fetch", self.host().await?);
        let mut params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        params.push(("namespace", namespace));

        let response = self
            .request(self.client.get(&url))
            .query(&params)
            .send()
            .await?;
        let fetched: FetchResponse = Self::check(response)
            .await
            .map_err(|e| match e {
                VectorStoreError::ServerError { .. } => e,
                other => VectorStoreError::FetchError(other.to_string()),
            })?
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;

        Ok(fetched.vectors.into_keys().collect())
    }

    async fn upsert(&self, entry: &IndexEntry, namespace: &str) -> Result<(), VectorStoreError> {
        let url = format!("{}/vectors/upsert", self.host().await?);
        let body = UpsertRequest {
            vectors: [UpsertVector {
                id: &entry.id,
                values: &entry.vector,
                metadata: &entry.document,
            }],
            namespace,
        };

        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>, VectorStoreError> {
        let url = format!("{}/query", self.host().await?);
        let body = QueryRequest {
            namespace,
            vector,
            top_k,
            include_values: false,
            include_metadata,
        };

        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        let result: QueryResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;

        Ok(result
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                id: m.id,
                score: m.score,
                document: m.metadata.map(Document::from_metadata).unwrap_or_default(),
            })
            .collect())
    }

    async fn namespace_count(&self, namespace: &str) -> Result<u64, VectorStoreError> {
        let url = format!("{}/describe_index_stats", self.host().await?);
        let response = self
            .request(self.client.post(&url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let stats: IndexStats = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;

        Ok(stats
            .namespaces
            .get(namespace)
            .map_or(0, |ns| ns.vector_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn description(url: &str, ready: bool) -> serde_json::Value {
        serde_json::json!({
            "name": "gse-index",
            "dimension": 3,
            "metric": "cosine",
            "host": url,
            "status": {"ready": ready, "state": if ready { "Ready" } else { "Initializing" }}
        })
    }

    fn index(url: &str) -> PineconeIndex {
        PineconeIndex::new(&IndexConfig::default(), url.to_string(), "pc-key".to_string()).unwrap()
    }

    /// Serve a ready description whose data-plane host is the same mock server.
    async fn ready_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/gse-index"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(&server.uri(), true)))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("gse-index-abc.svc.pinecone.io"),
            "https://gse-index-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://127.0.0.1:9/"), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_describe_missing_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/gse-index"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"error": "not found"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        assert!(index(&server.uri()).describe().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_index_creates_when_absent() {
        let host = "http://127.0.0.1:9";
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/gse-index"))
            .and(header("Api-Key", "pc-key"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"error": "not found"})),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .and(body_partial_json(serde_json::json!({
                "name": "gse-index",
                "dimension": 3,
                "metric": "cosine",
                "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(description(host, false)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indexes/gse-index"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(host, true)))
            .expect(1)
            .mount(&server)
            .await;

        let info = index(&server.uri()).ensure_index(3).await.unwrap();
        assert!(info.created);
        assert_eq!(info.dimension, 3);
    }

    #[tokio::test]
    async fn test_fetch_existing_and_query() {
        let server = ready_server().await;
        Mock::given(method("GET"))
            .and(path("/vectors/fetch"))
            .and(query_param("ids", "GSE1"))
            .and(query_param("ids", "GSE2"))
            .and(query_param("namespace", "ns1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "namespace": "ns1",
                "vectors": {"GSE2": {"id": "GSE2", "values": []}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_partial_json(serde_json::json!({
                "topK": 10,
                "includeValues": false,
                "includeMetadata": true,
                "namespace": "ns1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matches": [{"id": "GSE2", "score": 0.91, "metadata": {"title": "Liver", "samples": 4}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let index = index(&server.uri());
        let ids = vec!["GSE1".to_string(), "GSE2".to_string()];
        let existing = index.fetch_existing(&ids, "ns1").await.unwrap();
        assert_eq!(existing, HashSet::from(["GSE2".to_string()]));

        let matches = index.query(&[0.1, 0.2, 0.3], 10, "ns1", true).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "GSE2");
        assert_eq!(matches[0].document.get("title"), Some("Liver"));
        assert_eq!(matches[0].document.get("samples"), Some("4"));
    }

    #[tokio::test]
    async fn test_upsert_body() {
        let server = ready_server().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(body_partial_json(serde_json::json!({
                "namespace": "ns1",
                "vectors": [{"id": "GSE9", "values": [0.5, 0.5, 0.0], "metadata": {"series_id": "GSE9"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"upsertedCount": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let mut document = Document::new();
        document.insert("series_id", "GSE9");
        let entry = IndexEntry::new("GSE9", vec![0.5, 0.5, 0.0], document);
        index(&server.uri()).upsert(&entry, "ns1").await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_server_error_is_surfaced() {
        let server = ready_server().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let entry = IndexEntry::new("GSE9", vec![0.5, 0.5, 0.0], Document::new());
        let err = index(&server.uri()).upsert(&entry, "ns1").await.unwrap_err();
        assert!(matches!(err, VectorStoreError::ServerError { status: 503, .. }));
    }
}
