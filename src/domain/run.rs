//! Run state and reconstruction from events.
//!
//! A Run represents a single execution of the daily or weekly job.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventType, StageStatus};

/// Which scheduled job a run belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Ingest, merge, transcribe and summarize the day's recordings
    Daily,

    /// Fold the week's daily summaries into one long-form summary
    Weekly,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and output of one stage within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub output_ref: Option<String>,
    pub error: Option<String>,
}

/// A single daily or weekly run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Daily or weekly
    pub job: JobKind,

    /// Date label the run files its output under (MM-DD-YYYY)
    pub label: String,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Stages in the order they were first recorded
    pub stages: Vec<StageRecord>,
}

impl Run {
    /// Create a new run
    pub fn new(id: Uuid, job: JobKind, label: String) -> Self {
        Self {
            id,
            job,
            label,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            stages: Vec::new(),
        }
    }

    /// Reconstruct run state from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self {
            id: first_event.run_id,
            job: first_event.job.unwrap_or(JobKind::Daily),
            label: String::new(),
            state: RunState::Running,
            started_at: first_event.timestamp,
            completed_at: None,
            stages: Vec::new(),
        };

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
                if let Some(job) = event.job {
                    self.job = job;
                }
                if let Some(ref label) = event.output_ref {
                    self.label = label.clone();
                }
            }
            EventType::RunCompleted => {
                self.state = RunState::Completed;
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.state = RunState::Failed {
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::StageStarted
            | EventType::StageCompleted
            | EventType::StageFailed
            | EventType::StageSkipped => {
                if let Some(ref stage) = event.stage {
                    let record = self.record_mut(stage);
                    record.status = event.status;
                    if event.output_ref.is_some() {
                        record.output_ref = event.output_ref.clone();
                    }
                    if event.error.is_some() {
                        record.error = event.error.clone();
                    }
                }
            }
        }
    }

    fn record_mut(&mut self, stage: &str) -> &mut StageRecord {
        let index = match self.stages.iter().position(|r| r.name == stage) {
            Some(index) => index,
            None => {
                self.stages.push(StageRecord {
                    name: stage.to_string(),
                    status: StageStatus::Pending,
                    output_ref: None,
                    error: None,
                });
                self.stages.len() - 1
            }
        };
        &mut self.stages[index]
    }

    /// Set a stage's status directly (used while a run is live)
    pub fn set_stage(
        &mut self,
        stage: &str,
        status: StageStatus,
        output_ref: Option<String>,
        error: Option<String>,
    ) {
        let record = self.record_mut(stage);
        record.status = status;
        if output_ref.is_some() {
            record.output_ref = output_ref;
        }
        if error.is_some() {
            record.error = error;
        }
    }

    /// Status of a stage, if it was reached
    pub fn stage_status(&self, stage: &str) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|r| r.name == stage)
            .map(|r| r.status)
    }

    /// External reference a stage produced
    pub fn stage_output(&self, stage: &str) -> Option<&str> {
        self.stages
            .iter()
            .find(|r| r.name == stage)
            .and_then(|r| r.output_ref.as_deref())
    }

    /// Check if a specific stage completed
    pub fn is_stage_completed(&self, stage: &str) -> bool {
        self.stage_status(stage) == Some(StageStatus::Completed)
    }
}

/// State of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Currently executing
    Running,

    /// Finished without an aborting failure
    Completed,

    /// Aborted with error
    Failed { error: String },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Running
    }
}
