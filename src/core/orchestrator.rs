//! Main orchestrator for daily and weekly runs.
//!
//! Takes the per-job lock, opens the run journal, drives the job's stages
//! and records how the run ended.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::domain::{Event, EventType, JobKind, Run, RunState, StageStatus, TimeContext};
use crate::providers::Services;

use super::collect::SourceFilter;
use super::error::PipelineError;
use super::event_store::EventStore;
use super::lock::RunLock;
use super::stage::{StagePolicies, StageRunner};
use super::{daily, weekly};

/// Everything a run needs besides its providers
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Source-store folder holding new recordings
    pub source_folder: String,
    pub source_filter: SourceFilter,
    /// Local download and merge directory
    pub scratch_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub locks_dir: PathBuf,
    /// Extension of the merged recording (`m4a`)
    pub audio_extension: String,
    /// Document-store folder holding the year folders; top level when `None`
    pub root_folder_id: Option<String>,
    pub policies: StagePolicies,
}

impl JobSettings {
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let ignored = config.stages.ignored();
        if !ignored.is_empty() {
            warn!(stages = ?ignored, "Policy overrides ignored, these stages always abort");
        }

        Ok(Self {
            source_folder: config.source.folder.clone(),
            source_filter: SourceFilter::new(&config.source.patterns)?,
            scratch_dir: config.scratch.clone(),
            runs_dir: config.runs_dir(),
            locks_dir: config.locks_dir(),
            audio_extension: config.audio_extension.clone(),
            root_folder_id: config.google.root_folder_id.clone(),
            policies: config.stages.clone(),
        })
    }

    /// Default settings with all state under `home`
    pub fn in_home(home: &Path) -> Self {
        Self {
            source_folder: "/voice-memos".to_string(),
            source_filter: SourceFilter::default(),
            scratch_dir: home.join("scratch"),
            runs_dir: home.join("runs"),
            locks_dir: home.join("locks"),
            audio_extension: "m4a".to_string(),
            root_folder_id: None,
            policies: StagePolicies::default(),
        }
    }

    pub fn with_policies(mut self, policies: StagePolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_root_folder(mut self, root_folder_id: impl Into<String>) -> Self {
        self.root_folder_id = Some(root_folder_id.into());
        self
    }
}

/// Main orchestrator
pub struct Orchestrator {
    services: Services,
    settings: JobSettings,
}

impl Orchestrator {
    pub fn new(services: Services, settings: JobSettings) -> Self {
        Self { services, settings }
    }

    /// Run the daily job for `date`.
    ///
    /// Returns the finished run, failed or not. `Err` means the run could
    /// not start (lock held, journal unwritable).
    #[instrument(skip(self))]
    pub async fn run_daily(&self, date: NaiveDate) -> Result<Run> {
        self.run_job(JobKind::Daily, TimeContext::from_date(date))
            .await
    }

    /// Run the weekly job for the week containing `date`
    #[instrument(skip(self))]
    pub async fn run_weekly(&self, date: NaiveDate) -> Result<Run> {
        self.run_job(JobKind::Weekly, TimeContext::from_date(date))
            .await
    }

    async fn run_job(&self, job: JobKind, time: TimeContext) -> Result<Run> {
        let _lock = RunLock::acquire(&self.settings.locks_dir, job)?;

        let run_id = Uuid::new_v4();
        info!(%run_id, %job, date = %time.formatted_date, week = time.week_number, "Starting run");

        let store = EventStore::open(&self.settings.runs_dir, run_id).await?;
        let mut run = Run::new(run_id, job, time.formatted_date.clone());

        let start_event = Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("{}:start", run_id),
            format!("{} run for {} started", job, time.formatted_date),
            StageStatus::Running,
        )
        .with_job(job)
        .with_output_ref(Some(time.formatted_date.clone()));
        store.append(&start_event).await?;

        let result = {
            let mut runner = StageRunner::new(&store, &mut run, &self.settings.policies);
            match job {
                JobKind::Daily => {
                    daily::run(&mut runner, &self.services, &self.settings, &time).await
                }
                JobKind::Weekly => {
                    weekly::run(&mut runner, &self.services, &self.settings, &time).await
                }
            }
        };

        match result {
            Ok(()) => self.complete_run(&store, &mut run).await,
            Err(e) => self.handle_run_failure(&store, &mut run, e).await,
        }
    }

    /// Handle a run failure
    async fn handle_run_failure(
        &self,
        store: &EventStore,
        run: &mut Run,
        error: PipelineError,
    ) -> Result<Run> {
        let error_msg = error.to_string();
        error!(run_id = %run.id, %error_msg, "Run failed");

        run.state = RunState::Failed {
            error: error_msg.clone(),
        };
        run.completed_at = Some(chrono::Utc::now());

        let event = Event::new(
            run.id,
            None,
            EventType::RunFailed,
            format!("{}:complete", run.id),
            format!("Run failed: {}", error_msg),
            StageStatus::Failed,
        )
        .with_error(error_msg);
        store.append(&event).await?;

        Ok(run.clone())
    }

    /// Complete a successful run
    async fn complete_run(&self, store: &EventStore, run: &mut Run) -> Result<Run> {
        info!(run_id = %run.id, "Run completed");

        run.state = RunState::Completed;
        run.completed_at = Some(chrono::Utc::now());

        let event = Event::new(
            run.id,
            None,
            EventType::RunCompleted,
            format!("{}:complete", run.id),
            format!("{} run for {} completed", run.job, run.label),
            StageStatus::Completed,
        );
        store.append(&event).await?;

        Ok(run.clone())
    }

    /// Get status of a run by ID
    pub async fn get_run_status(&self, run_id: Uuid) -> Result<Run> {
        load_run(&self.settings.runs_dir, run_id).await
    }

    /// List recent runs, most recent first
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<Run>> {
        list_runs(&self.settings.runs_dir, limit).await
    }
}

/// Replay one run's journal
pub async fn load_run(runs_dir: &Path, run_id: Uuid) -> Result<Run> {
    if !runs_dir.join(run_id.to_string()).is_dir() {
        anyhow::bail!("Run {} not found", run_id);
    }

    let store = EventStore::open(runs_dir, run_id).await?;
    let events = store.replay().await?;

    if events.is_empty() {
        anyhow::bail!("Run {} not found", run_id);
    }

    Run::from_events(&events).context("Failed to reconstruct run state")
}

/// Replay every journal under `runs_dir`, most recent first
pub async fn list_runs(runs_dir: &Path, limit: usize) -> Result<Vec<Run>> {
    let run_ids = EventStore::list_runs(runs_dir).await?;
    let mut runs = Vec::new();

    for run_id in run_ids {
        match load_run(runs_dir, run_id).await {
            Ok(run) => runs.push(run),
            Err(e) => warn!(%run_id, error = %e, "Skipping unreadable run"),
        }
    }

    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    runs.truncate(limit);

    Ok(runs)
}
