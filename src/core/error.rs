//! Pipeline error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use super::stage::Stage;
use crate::domain::JobKind;

/// Errors that end a run (or a stage, before policy is applied)
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source folder had nothing to process
    #[error("No source items available in {folder}")]
    EmptyInput { folder: String },

    /// A source item could not be fetched to scratch space
    #[error("Failed to download {item}: {message}")]
    Download { item: String, message: String },

    /// The external merge operation reported an error
    #[error("Merge failed: {0}")]
    Merge(String),

    /// A provider call failed inside a stage whose policy aborts the run
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: Stage, message: String },

    /// Another run of the same job holds the lock
    #[error("A {job} run is already in progress (lock held on {})", path.display())]
    AlreadyRunning { job: JobKind, path: PathBuf },

    /// The lock file could not be created or opened
    #[error("Run lock error: {0}")]
    Lock(String),

    /// Local scratch space could not be prepared
    #[error("Scratch directory error: {0}")]
    Scratch(String),

    /// The run journal could not be written
    #[error("Run journal error: {0}")]
    Journal(String),

    /// A provider error not yet attributed to a stage
    #[error("{0}")]
    Service(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        PipelineError::Service(format!("{:#}", e))
    }
}

impl PipelineError {
    /// Attribute an unattributed provider error to the stage it happened in
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            PipelineError::Service(message) => PipelineError::Stage { stage, message },
            other => other,
        }
    }

    /// True for the fatal "nothing to do" condition
    pub fn is_empty_input(&self) -> bool {
        matches!(self, PipelineError::EmptyInput { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_attribution() {
        let err: PipelineError = anyhow::anyhow!("503 from upstream").into();
        let err = err.in_stage(Stage::Summarize);

        match err {
            PipelineError::Stage { stage, message } => {
                assert_eq!(stage, Stage::Summarize);
                assert_eq!(message, "503 from upstream");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_typed_errors_keep_their_kind() {
        let err = PipelineError::Merge("codec mismatch".to_string()).in_stage(Stage::Merge);
        assert!(matches!(err, PipelineError::Merge(_)));
        assert_eq!(err.to_string(), "Merge failed: codec mismatch");
    }

    #[test]
    fn test_empty_input_message() {
        let err = PipelineError::EmptyInput {
            folder: "/voice-memos".to_string(),
        };
        assert!(err.is_empty_input());
        assert_eq!(err.to_string(), "No source items available in /voice-memos");
    }
}
