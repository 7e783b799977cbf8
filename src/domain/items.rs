//! Source recordings and document-store folders.

use serde::{Deserialize, Serialize};

/// One recording waiting in the source folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    /// File name as listed (`memo1.m4a`)
    pub name: String,

    /// Full path in the source store, used for deletion
    pub path: String,

    /// Time-limited download link resolved at collection time
    pub download_link: String,

    /// Folder the item was collected from
    pub origin: String,
}

/// A folder in the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    pub name: String,
    pub id: String,
    pub parent_id: Option<String>,
}

/// The year and week folders a run files its output into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekFolders {
    pub year: FolderNode,
    pub week: FolderNode,
}
