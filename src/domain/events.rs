//! Event types for the run journal.
//!
//! Every stage transition of a daily or weekly run is recorded as an
//! immutable event in an append-only log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::run::JobKind;

/// A single event in the append-only run journal.
///
/// Events are the source of truth for run history. The state of any past run
/// can be reconstructed by replaying its events in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Stage name (if applicable)
    pub stage: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Idempotency key format: "{run_id}:{stage}:{input_hash}"
    pub idempotency_key: String,

    /// Human-readable summary (NO secrets)
    pub payload_summary: String,

    /// Current status of the stage/run
    pub status: StageStatus,

    /// Time taken in milliseconds (for finished stages)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,

    /// External reference produced by the stage (document or file id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    /// Job kind, recorded on `run_started`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobKind>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        stage: Option<String>,
        event_type: EventType,
        idempotency_key: String,
        payload_summary: String,
        status: StageStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            stage,
            event_type,
            idempotency_key,
            payload_summary,
            status,
            duration_ms: None,
            error: None,
            output_ref: None,
            job: None,
        }
    }

    /// Create an event with duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    /// Attach the external reference a stage produced
    pub fn with_output_ref(mut self, output_ref: Option<String>) -> Self {
        self.output_ref = output_ref;
        self
    }

    /// Record which job a run belongs to
    pub fn with_job(mut self, job: JobKind) -> Self {
        self.job = Some(job);
        self
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// A run completed without an aborting failure
    RunCompleted,

    /// A run was aborted
    RunFailed,

    /// A stage has started
    StageStarted,

    /// A stage completed successfully
    StageCompleted,

    /// A stage failed (the run may continue, depending on policy)
    StageFailed,

    /// A stage was not invoked because its input was unavailable
    StageSkipped,
}

/// Status of a stage or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,

    /// Skipped (missing input)
    Skipped,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("transcribe".to_string()),
            EventType::StageStarted,
            "test-key".to_string(),
            "Starting transcribe stage".to_string(),
            StageStatus::Running,
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("output_ref"));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, EventType::StageStarted);
        assert_eq!(parsed.status, StageStatus::Running);
        assert_eq!(parsed.output_ref, None);
    }

    #[test]
    fn test_event_with_output_ref() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("store_summary".to_string()),
            EventType::StageCompleted,
            "test-key".to_string(),
            "Stored summary".to_string(),
            StageStatus::Completed,
        )
        .with_duration(1500)
        .with_output_ref(Some("doc-42".to_string()));

        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.output_ref.as_deref(), Some("doc-42"));
    }

    #[test]
    fn test_event_with_error() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("transcribe".to_string()),
            EventType::StageFailed,
            "test-key".to_string(),
            "Transcription failed".to_string(),
            StageStatus::Failed,
        )
        .with_error("Connection timeout".to_string());

        assert_eq!(event.error, Some("Connection timeout".to_string()));
    }
}
