//! Stage outcomes and failure policy.
//!
//! Every stage of both jobs runs through [`StageRunner::execute`], which
//! journals the attempt and turns the stage's result into a
//! [`StageOutcome`]. Whether a failure ends the run is decided here, from
//! the stage's [`FailurePolicy`], and nowhere else.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::error::PipelineError;
use super::event_store::{generate_idempotency_key, EventStore};
use crate::domain::{
    DocumentContent, Event, EventType, MergedArtifact, Run, SourceItem, StageStatus,
    StoredDocument, WeekFolders,
};

/// The stages of the daily and weekly jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    // daily
    Collect,
    ResolveFolders,
    Merge,
    Upload,
    Transcribe,
    StoreTranscript,
    Summarize,
    StoreSummary,
    Cleanup,

    // weekly
    LocateWeek,
    GatherSummaries,
    Aggregate,
    StoreWeekly,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::ResolveFolders => "resolve_folders",
            Self::Merge => "merge",
            Self::Upload => "upload",
            Self::Transcribe => "transcribe",
            Self::StoreTranscript => "store_transcript",
            Self::Summarize => "summarize",
            Self::StoreSummary => "store_summary",
            Self::Cleanup => "cleanup",
            Self::LocateWeek => "locate_week",
            Self::GatherSummaries => "gather_summaries",
            Self::Aggregate => "aggregate",
            Self::StoreWeekly => "store_weekly",
        }
    }

    /// Stages whose failure policy may be overridden.
    ///
    /// The rest are preconditions of everything after them and always abort.
    pub fn is_configurable(&self) -> bool {
        matches!(
            self,
            Self::Upload
                | Self::Transcribe
                | Self::StoreTranscript
                | Self::Summarize
                | Self::StoreSummary
                | Self::Cleanup
                | Self::Aggregate
                | Self::StoreWeekly
        )
    }

    /// Policy applied when nothing is configured
    pub fn default_policy(&self) -> FailurePolicy {
        match self {
            Self::Transcribe | Self::StoreTranscript | Self::StoreSummary | Self::StoreWeekly => {
                FailurePolicy::Continue
            }
            _ => FailurePolicy::Abort,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage failure does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// End the run; nothing after this stage executes
    Abort,

    /// Log the failure; dependent stages are skipped, independent ones run
    Continue,
}

/// Per-stage policy overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagePolicies {
    overrides: HashMap<Stage, FailurePolicy>,
}

impl StagePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override one stage's policy (ignored for precondition stages)
    pub fn with(mut self, stage: Stage, policy: FailurePolicy) -> Self {
        self.overrides.insert(stage, policy);
        self
    }

    /// Effective policy for a stage
    pub fn policy(&self, stage: Stage) -> FailurePolicy {
        if !stage.is_configurable() {
            return FailurePolicy::Abort;
        }
        self.overrides
            .get(&stage)
            .copied()
            .unwrap_or_else(|| stage.default_policy())
    }

    /// Overrides that will be ignored because the stage always aborts
    pub fn ignored(&self) -> Vec<Stage> {
        let mut ignored: Vec<Stage> = self
            .overrides
            .keys()
            .filter(|stage| !stage.is_configurable())
            .copied()
            .collect();
        ignored.sort_by_key(|stage| stage.as_str());
        ignored
    }
}

/// Result of one stage
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// The stage produced its output
    Completed(T),

    /// The stage failed and its policy let the run continue
    Failed(String),

    /// The stage did not run because an input was unavailable
    Skipped(String),
}

impl<T> StageOutcome<T> {
    /// The output, if the stage completed
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn status(&self) -> StageStatus {
        match self {
            Self::Completed(_) => StageStatus::Completed,
            Self::Failed(_) => StageStatus::Failed,
            Self::Skipped(_) => StageStatus::Skipped,
        }
    }
}

/// Stage outputs that leave a reference in the document or file store
pub trait StageOutput {
    /// External id to journal with the completion event
    fn output_ref(&self) -> Option<String> {
        None
    }
}

impl StageOutput for () {}

impl StageOutput for String {}

impl StageOutput for Vec<SourceItem> {}

impl StageOutput for Vec<DocumentContent> {}

impl StageOutput for MergedArtifact {
    fn output_ref(&self) -> Option<String> {
        self.remote_id.clone()
    }
}

impl StageOutput for StoredDocument {
    fn output_ref(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

impl StageOutput for WeekFolders {
    fn output_ref(&self) -> Option<String> {
        Some(self.week.id.clone())
    }
}

impl<T: StageOutput> StageOutput for Option<T> {
    fn output_ref(&self) -> Option<String> {
        self.as_ref().and_then(StageOutput::output_ref)
    }
}

/// Executes stages for one run, journaling each transition
pub struct StageRunner<'a> {
    store: &'a EventStore,
    run: &'a mut Run,
    policies: &'a StagePolicies,
}

impl<'a> StageRunner<'a> {
    pub fn new(store: &'a EventStore, run: &'a mut Run, policies: &'a StagePolicies) -> Self {
        Self {
            store,
            run,
            policies,
        }
    }

    /// The run being executed
    pub fn run(&self) -> &Run {
        self.run
    }

    fn key(&self, stage: Stage, input: &str) -> String {
        generate_idempotency_key(self.run.id, stage.as_str(), input)
    }

    async fn journal(&mut self, event: Event) -> Result<(), PipelineError> {
        if let Some(ref stage) = event.stage {
            self.run.set_stage(
                stage,
                event.status,
                event.output_ref.clone(),
                event.error.clone(),
            );
        }
        self.store
            .append(&event)
            .await
            .map_err(|e| PipelineError::Journal(format!("{:#}", e)))
    }

    /// Run a stage and apply its failure policy.
    ///
    /// Returns `Err` only when the stage failed under [`FailurePolicy::Abort`]
    /// or the journal could not be written.
    pub async fn execute<T, F>(
        &mut self,
        stage: Stage,
        input: &str,
        work: F,
    ) -> Result<StageOutcome<T>, PipelineError>
    where
        T: StageOutput,
        F: Future<Output = Result<T, PipelineError>>,
    {
        let idem_key = self.key(stage, input);
        let run_id = self.run.id;

        self.journal(Event::new(
            run_id,
            Some(stage.to_string()),
            EventType::StageStarted,
            idem_key.clone(),
            format!("Stage '{}' started", stage),
            StageStatus::Running,
        ))
        .await?;

        let started = Instant::now();
        let result = work.await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                let output_ref = value.output_ref();
                info!(%stage, duration_ms, output = ?output_ref, "Stage completed");

                self.journal(
                    Event::new(
                        run_id,
                        Some(stage.to_string()),
                        EventType::StageCompleted,
                        idem_key,
                        format!("Stage '{}' completed in {}ms", stage, duration_ms),
                        StageStatus::Completed,
                    )
                    .with_duration(duration_ms)
                    .with_output_ref(output_ref),
                )
                .await?;

                Ok(StageOutcome::Completed(value))
            }
            Err(e) => {
                let message = e.to_string();
                let policy = self.policies.policy(stage);

                self.journal(
                    Event::new(
                        run_id,
                        Some(stage.to_string()),
                        EventType::StageFailed,
                        idem_key,
                        format!("Stage '{}' failed", stage),
                        StageStatus::Failed,
                    )
                    .with_duration(duration_ms)
                    .with_error(message.clone()),
                )
                .await?;

                match policy {
                    FailurePolicy::Abort => {
                        error!(%stage, error = %message, "Stage failed, aborting run");
                        Err(e.in_stage(stage))
                    }
                    FailurePolicy::Continue => {
                        warn!(%stage, error = %message, "Stage failed, continuing");
                        Ok(StageOutcome::Failed(message))
                    }
                }
            }
        }
    }

    /// Run a stage whose output everything after it needs.
    ///
    /// Any outcome other than `Completed` ends the run.
    pub async fn require<T, F>(&mut self, stage: Stage, input: &str, work: F) -> Result<T, PipelineError>
    where
        T: StageOutput,
        F: Future<Output = Result<T, PipelineError>>,
    {
        match self.execute(stage, input, work).await? {
            StageOutcome::Completed(value) => Ok(value),
            StageOutcome::Failed(message) | StageOutcome::Skipped(message) => {
                Err(PipelineError::Stage { stage, message })
            }
        }
    }

    /// Record that a stage was not invoked
    pub async fn skip<T>(
        &mut self,
        stage: Stage,
        input: &str,
        reason: &str,
    ) -> Result<StageOutcome<T>, PipelineError> {
        info!(%stage, reason, "Stage skipped");

        let event = Event::new(
            self.run.id,
            Some(stage.to_string()),
            EventType::StageSkipped,
            self.key(stage, input),
            format!("Stage '{}' skipped: {}", stage, reason),
            StageStatus::Skipped,
        );
        self.journal(event).await?;

        Ok(StageOutcome::Skipped(reason.to_string()))
    }
}
