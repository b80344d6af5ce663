use serde::{Deserialize, Serialize};

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Diff,
    EmbedAndWrite,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Load => write!(f, "LOAD"),
            Stage::Diff => write!(f, "DIFF"),
            Stage::EmbedAndWrite => write!(f, "EMBED_AND_WRITE"),
            Stage::Done => write!(f, "DONE"),
        }
    }
}

/// Counts reported at the end of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Rows read from the metadata store
    pub total_records: u64,
    /// Distinct non-empty identifiers among those rows
    pub total_candidates: u64,
    /// Rows without an identifier, never embedded
    pub skipped_without_id: u64,
    /// Candidates already present in the index
    pub already_indexed: u64,
    /// Candidates selected for embedding
    pub to_process: u64,
    /// Entries successfully upserted in this run
    pub indexed: u64,
    pub embedding_failures: u64,
    pub upsert_failures: u64,
    /// True when the run stopped after the diff
    pub dry_run: bool,
    pub started_at: String,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn failures(&self) -> u64 {
        self.embedding_failures + self.upsert_failures
    }
}
