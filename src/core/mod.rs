//! Core orchestration logic.
//!
//! This module contains:
//! - Folders / Collect / Merge: the building blocks of the daily job
//! - Stage: outcome type, failure policy and the journaling stage runner
//! - EventStore: append-only run journal
//! - Lock: one run per job at a time
//! - Orchestrator: main execution engine for the daily and weekly jobs

pub mod collect;
pub mod daily;
pub mod documents;
pub mod error;
pub mod event_store;
pub mod folders;
pub mod lock;
pub mod merge;
pub mod orchestrator;
pub mod stage;
pub mod weekly;

// Re-export commonly used types
pub use collect::{collect, SourceFilter};
pub use error::PipelineError;
pub use event_store::{generate_idempotency_key, hash_input, EventStore};
pub use folders::FolderResolver;
pub use lock::RunLock;
pub use merge::{download_all, merge_items, prepare_scratch};
pub use orchestrator::{JobSettings, Orchestrator};
pub use stage::{FailurePolicy, Stage, StageOutcome, StagePolicies, StageRunner};
