//! Search-related models for queries and results.

use serde::{Deserialize, Serialize};

use super::document::Document;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// A single nearest-neighbour match returned by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    /// Entry identifier (series id)
    pub id: String,

    /// Cosine similarity score
    pub score: f32,

    /// Stored document metadata
    pub document: Document,
}

/// Collection of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// Query that was executed
    pub query: String,

    /// Matches, best first
    pub matches: Vec<IndexMatch>,

    /// Query execution time in milliseconds
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn new(query: String, matches: Vec<IndexMatch>, duration_ms: u64) -> Self {
        Self {
            query,
            matches,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }
}
