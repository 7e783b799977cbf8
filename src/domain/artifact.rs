//! Artifacts produced by a run.
//!
//! The merged recording lives on local scratch space until it is uploaded;
//! documents live only in the document store and are referenced by id.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The single recording produced by merging a run's source items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedArtifact {
    /// Local scratch path of the merged file
    pub local_path: PathBuf,

    /// Remote file name (`MM-DD-YYYY.<ext>`)
    pub file_name: String,

    /// Remote file id, set once uploaded
    pub remote_id: Option<String>,
}

impl MergedArtifact {
    /// Create an artifact that has not been uploaded yet
    pub fn new(local_path: PathBuf, file_name: String) -> Self {
        Self {
            local_path,
            file_name,
            remote_id: None,
        }
    }

    /// Record the remote id after upload
    pub fn uploaded(mut self, remote_id: String) -> Self {
        self.remote_id = Some(remote_id);
        self
    }
}

/// A document created by a run. Documents are written once and never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Document id in the document store
    pub id: String,

    /// Document title (`MM-DD-YYYY-summary`, `week-N-summary`, ...)
    pub title: String,

    /// What the document holds
    pub kind: DocumentKind,
}

/// Kinds of documents a run writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Raw transcript of the day's recordings
    Transcript,

    /// Daily journal entry
    Summary,

    /// Long-form summary of a week's entries
    WeeklySummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_upload_records_id() {
        let artifact = MergedArtifact::new(
            PathBuf::from("/tmp/scratch/03-14-2024.m4a"),
            "03-14-2024.m4a".to_string(),
        );
        assert!(artifact.remote_id.is_none());

        let artifact = artifact.uploaded("file-1".to_string());
        assert_eq!(artifact.remote_id.as_deref(), Some("file-1"));
    }

    #[test]
    fn test_document_kind_serialization() {
        let json = serde_json::to_string(&DocumentKind::WeeklySummary).unwrap();
        assert_eq!(json, "\"weekly_summary\"");
    }
}
