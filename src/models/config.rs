use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_PINECONE_API_URL: &str = "https://api.pinecone.io";
pub const DEFAULT_PINECONE_API_VERSION: &str = "2024-07";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_EMBEDDING_MODEL: &str = "multilingual-e5-large";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1024;
pub const DEFAULT_INDEX_NAME: &str = "gse-index";
pub const DEFAULT_NAMESPACE: &str = "ns1";
pub const DEFAULT_METADATA_TABLE: &str = "gse_metadata";
pub const DEFAULT_SIZE_BUDGET: usize = 40 * 1024;
pub const DEFAULT_FIELD_TRUNCATE_SIZE: usize = 1000;
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 1000;
/// Largest id list a Pinecone fetch request accepts.
pub const PINECONE_MAX_FETCH_BATCH: usize = 1000;

pub const PINECONE_API_KEY_ENV: &str = "PINECONE_API_KEY";
pub const EMBEDDING_API_KEY_ENV: &str = "EMBEDDING_API_KEY";
pub const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub document: DocumentConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("geoindex").join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::PathError(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                Some(p.to_path_buf())
            }
            None => Self::config_path().filter(|p| p.exists()),
        };

        let config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(&p)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.metadata.table.is_empty()
            || !self
                .metadata
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return invalid("metadata.table must match [A-Za-z0-9_]+");
        }
        if self.document.size_budget < 2 {
            return invalid("document.size_budget must be at least 2 bytes");
        }
        if self.document.field_truncate_size == 0 {
            return invalid("document.field_truncate_size must be at least 1");
        }
        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension must be at least 1");
        }
        if self.embedding.model.is_empty() {
            return invalid("embedding.model must not be empty");
        }
        if self.embedding.max_retries == 0 {
            return invalid("embedding.max_retries must be at least 1");
        }
        if self.index.name.is_empty() {
            return invalid("index.name must not be empty");
        }
        if self.index.fetch_batch_size == 0 {
            return invalid("index.fetch_batch_size must be at least 1");
        }
        if self.index.driver == IndexDriver::Pinecone
            && self.index.fetch_batch_size > PINECONE_MAX_FETCH_BATCH
        {
            return invalid("index.fetch_batch_size must be at most 1000 for pinecone");
        }
        if self.search.top_k == 0 {
            return invalid("search.top_k must be at least 1");
        }
        if self.search.max_attempts == 0 {
            return invalid("search.max_attempts must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("gse_metadata.db")
}

fn default_table() -> String {
    DEFAULT_METADATA_TABLE.to_string()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            table: default_table(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_priority_fields")]
    pub priority_fields: Vec<String>,

    #[serde(default = "default_field_truncate_size")]
    pub field_truncate_size: usize,

    #[serde(default = "default_size_budget")]
    pub size_budget: usize,
}

fn default_priority_fields() -> Vec<String> {
    vec![
        "data_processing".to_string(),
        "extract_protocol".to_string(),
        "overall_design".to_string(),
    ]
}

fn default_field_truncate_size() -> usize {
    DEFAULT_FIELD_TRUNCATE_SIZE
}

fn default_size_budget() -> usize {
    DEFAULT_SIZE_BUDGET
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            priority_fields: default_priority_fields(),
            field_truncate_size: default_field_truncate_size(),
            size_budget: default_size_budget(),
        }
    }
}

/// Remote embedding service flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Pinecone inference API
    #[default]
    Pinecone,
    /// Text Embeddings Inference compatible `/embed` server
    Tei,
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Pinecone => write!(f, "pinecone"),
            EmbeddingProvider::Tei => write!(f, "tei"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_embedding_url() -> String {
    DEFAULT_PINECONE_API_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_max_delay_secs() -> u64 {
    120
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Vector index backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDriver {
    #[default]
    Pinecone,
    Qdrant,
    #[serde(alias = "postgres", alias = "pgvector")]
    PostgreSQL,
}

impl std::fmt::Display for IndexDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexDriver::Pinecone => write!(f, "pinecone"),
            IndexDriver::Qdrant => write!(f, "qdrant"),
            IndexDriver::PostgreSQL => write!(f, "postgresql"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub driver: IndexDriver,

    #[serde(default = "default_index_name")]
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Control-plane URL (Pinecone), server URL (Qdrant) or connection URL (PostgreSQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_cloud")]
    pub cloud: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,

    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_api_version() -> String {
    DEFAULT_PINECONE_API_VERSION.to_string()
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_fetch_batch_size() -> usize {
    DEFAULT_FETCH_BATCH_SIZE
}

fn default_index_timeout() -> u64 {
    30
}

fn default_ready_timeout() -> u64 {
    300
}

fn default_pool_max() -> u32 {
    5
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            driver: IndexDriver::default(),
            name: default_index_name(),
            namespace: default_namespace(),
            url: None,
            api_version: default_api_version(),
            cloud: default_cloud(),
            region: default_region(),
            fetch_batch_size: default_fetch_batch_size(),
            timeout_secs: default_index_timeout(),
            ready_timeout_secs: default_ready_timeout(),
            pool_max: default_pool_max(),
        }
    }
}

impl IndexConfig {
    /// URL for the configured driver, falling back to its conventional default.
    pub fn resolved_url(&self, credentials: &Credentials) -> Option<String> {
        match self.driver {
            IndexDriver::Pinecone => Some(
                self.url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PINECONE_API_URL.to_string()),
            ),
            IndexDriver::Qdrant => Some(
                self.url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            ),
            IndexDriver::PostgreSQL => self
                .url
                .clone()
                .or_else(|| credentials.database_url.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_search_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_search_base_delay")]
    pub base_delay_secs: u64,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_top_k() -> u32 {
    10
}

fn default_search_attempts() -> u32 {
    5
}

fn default_search_base_delay() -> u64 {
    20
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_attempts: default_search_attempts(),
            base_delay_secs: default_search_base_delay(),
            default_format: OutputFormat::Text,
        }
    }
}

/// Secrets resolved from the environment. Never written to the config file.
#[derive(Clone, Default)]
pub struct Credentials {
    pub pinecone_api_key: Option<String>,
    pub embedding_api_key: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub database_url: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("pinecone_api_key", &mask(&self.pinecone_api_key))
            .field("embedding_api_key", &mask(&self.embedding_api_key))
            .field("qdrant_api_key", &mask(&self.qdrant_api_key))
            .field("database_url", &mask(&self.database_url))
            .finish()
    }
}

impl Credentials {
    /// Resolve credentials from process environment variables.
    pub fn from_env(config: &Config) -> Result<Self, ConfigError> {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Resolve credentials through `lookup`, failing when the configured
    /// backends need a value that is absent.
    pub fn from_lookup<F>(config: &Config, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = Self {
            pinecone_api_key: get(PINECONE_API_KEY_ENV),
            embedding_api_key: get(EMBEDDING_API_KEY_ENV),
            qdrant_api_key: get(QDRANT_API_KEY_ENV),
            database_url: get(DATABASE_URL_ENV),
        };

        let needs_pinecone = config.index.driver == IndexDriver::Pinecone
            || config.embedding.provider == EmbeddingProvider::Pinecone;
        if needs_pinecone && credentials.pinecone_api_key.is_none() {
            return Err(ConfigError::MissingCredential(
                PINECONE_API_KEY_ENV.to_string(),
            ));
        }

        if config.index.driver == IndexDriver::PostgreSQL
            && config.index.url.is_none()
            && credentials.database_url.is_none()
        {
            return Err(ConfigError::MissingCredential(DATABASE_URL_ENV.to_string()));
        }

        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.index.name, DEFAULT_INDEX_NAME);
        assert_eq!(config.index.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.document.size_budget, 40960);
        assert_eq!(config.document.field_truncate_size, 1000);
        assert_eq!(config.document.priority_fields[0], "data_processing");
        assert_eq!(config.search.max_attempts, 5);
        assert_eq!(config.search.base_delay_secs, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [index]
            driver = "qdrant"
            namespace = "geo"

            [document]
            size_budget = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.index.driver, IndexDriver::Qdrant);
        assert_eq!(config.index.namespace, "geo");
        assert_eq!(config.index.name, DEFAULT_INDEX_NAME);
        assert_eq!(config.document.size_budget, 1024);
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn test_postgres_driver_aliases() {
        let config: Config = toml::from_str("[index]\ndriver = \"pgvector\"\n").unwrap();
        assert_eq!(config.index.driver, IndexDriver::PostgreSQL);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.index.namespace = "test-ns".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.index.namespace, "test-ns");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::PathError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_table() {
        let mut config = Config::default();
        config.metadata.table = "gse; DROP TABLE x".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_caps_pinecone_fetch_batch() {
        let mut config = Config::default();
        config.index.fetch_batch_size = PINECONE_MAX_FETCH_BATCH;
        assert!(config.validate().is_ok());

        config.index.fetch_batch_size = PINECONE_MAX_FETCH_BATCH + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.index.driver = IndexDriver::Qdrant;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_credentials_require_pinecone_key() {
        let config = Config::default();
        let result = Credentials::from_lookup(&config, lookup(&[]));
        assert!(
            matches!(result, Err(ConfigError::MissingCredential(ref k)) if k == PINECONE_API_KEY_ENV)
        );

        let credentials =
            Credentials::from_lookup(&config, lookup(&[(PINECONE_API_KEY_ENV, "pc-key")])).unwrap();
        assert_eq!(credentials.pinecone_api_key.as_deref(), Some("pc-key"));
    }

    #[test]
    fn test_credentials_blank_value_is_missing() {
        let config = Config::default();
        let result = Credentials::from_lookup(&config, lookup(&[(PINECONE_API_KEY_ENV, "  ")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_credentials_for_self_hosted_stack() {
        let mut config = Config::default();
        config.index.driver = IndexDriver::Qdrant;
        config.embedding.provider = EmbeddingProvider::Tei;
        assert!(Credentials::from_lookup(&config, lookup(&[])).is_ok());

        config.index.driver = IndexDriver::PostgreSQL;
        assert!(matches!(
            Credentials::from_lookup(&config, lookup(&[])),
            Err(ConfigError::MissingCredential(ref k)) if k == DATABASE_URL_ENV
        ));
    }

    #[test]
    fn test_credentials_debug_masks_secrets() {
        let credentials = Credentials {
            pinecone_api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("secret"));
    }
}
