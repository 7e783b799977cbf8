//! daybook - Voice memo journal pipeline
//!
//! Turns a day's voice recordings into journal documents filed by week,
//! and once a week folds the daily entries into one long-form summary.
//!
//! # Architecture
//!
//! Every run is event sourced:
//! - Each stage transition is appended to the run's journal
//! - Run state is derived by replaying the journal
//! - Each stage produces a uniform outcome; a per-stage policy decides
//!   whether a failure ends the run
//!
//! # Modules
//!
//! - `providers`: Source store, document store, merger, transcriber and
//!   summarizer interfaces, with HTTP, subprocess and in-memory backends
//! - `core`: Orchestration logic (stages, daily and weekly jobs, journal)
//! - `domain`: Data structures (TimeContext, Event, Run, documents)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Process today's recordings
//! daybook daily
//!
//! # Summarize the week containing a date
//! daybook weekly --date 2024-03-15
//!
//! # Check run status
//! daybook status <run-id>
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod providers;

// Re-export main types at crate root for convenience
pub use core::{JobSettings, Orchestrator, PipelineError};
pub use domain::{Event, EventType, JobKind, Run, RunState, TimeContext};
pub use providers::Services;
