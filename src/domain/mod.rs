//! Domain types for the journal pipeline.
//!
//! This module contains the core data structures:
//! - Time: calendar identifiers and naming conventions
//! - Items: source recordings and document-store folders
//! - Artifact / Document: what a run produces and reads back
//! - Events / Run: the run journal

pub mod artifact;
pub mod document;
pub mod events;
pub mod items;
pub mod run;
pub mod time;

// Re-export commonly used types
pub use artifact::{DocumentKind, MergedArtifact, StoredDocument};
pub use document::DocumentContent;
pub use events::{Event, EventType, StageStatus};
pub use items::{FolderNode, SourceItem, WeekFolders};
pub use run::{JobKind, Run, RunState, StageRecord};
pub use time::TimeContext;
