//! Centralised error type for the document store and the ingestion routine.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No document at path {0:?}")]
    NotFound(String),

    #[error("Invalid front matter in {path}: {reason}")]
    FrontMatter { path: PathBuf, reason: String },

    #[error("Duplicate document path {0:?}")]
    DuplicatePath(String),

    #[error("Source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("Schema mismatch for dataset {dataset}: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        dataset: String,
        expected: String,
        found: String,
    },

    #[error("Dataset {0:?} has not been provisioned")]
    UnknownDataset(String),

    #[error("Invalid dataset name {0:?}")]
    InvalidDatasetName(String),

    #[error("Refusing to append an empty batch to {0}")]
    EmptyBatch(String),

    #[error("Invalid record for key {key}: {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("A previous run is still in progress; skipping")]
    RunSkipped,

    #[error("Run exceeded its deadline of {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl PipelineError {
    /// Errors the external trigger may clear by invoking the routine again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceUnavailable { .. } | PipelineError::DeadlineExceeded(_)
        )
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_source_and_deadline_failures_are_transient() {
        let source = PipelineError::SourceUnavailable {
            source_name: "quotes".into(),
            reason: "timeout".into(),
        };
        assert!(source.is_transient());
        assert!(PipelineError::DeadlineExceeded(std::time::Duration::from_secs(1)).is_transient());

        let mismatch = PipelineError::SchemaMismatch {
            dataset: "market_tracker".into(),
            expected: "value: float64".into(),
            found: "value: string".into(),
        };
        assert!(!mismatch.is_transient());
        assert!(!PipelineError::NotFound("about".into()).is_transient());
    }
}
