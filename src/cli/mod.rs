//! Command-line interface for daybook.
//!
//! Provides commands for running the daily and weekly jobs, checking run
//! status, listing runs and showing the resolved configuration.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::{self, Credentials, ResolvedConfig};
use crate::core::orchestrator::{list_runs, load_run};
use crate::core::{JobSettings, Orchestrator};
use crate::domain::{Run, RunState};
use crate::providers::Services;

/// daybook - Voice memo journal pipeline
#[derive(Parser, Debug)]
#[command(name = "daybook")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge, transcribe and summarize today's recordings
    Daily {
        /// Date to file the entry under (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Summarize a week's daily entries
    Weekly {
        /// Any date in the week (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show current configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Daily { date } => run_daily(date.unwrap_or_else(today)).await,
            Commands::Weekly { date } => run_weekly(date.unwrap_or_else(today)).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => show_runs(limit).await,
            Commands::Config => show_config(),
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn build_orchestrator(cfg: &ResolvedConfig) -> Result<Orchestrator> {
    let credentials = Credentials::from_env()?;
    let services = Services::from_config(cfg, &credentials)?;
    let settings = JobSettings::from_config(cfg)?;
    Ok(Orchestrator::new(services, settings))
}

async fn run_daily(date: NaiveDate) -> Result<()> {
    let cfg = config::load_config()?;
    let run = build_orchestrator(&cfg)?.run_daily(date).await?;
    report(&run);
    Ok(())
}

async fn run_weekly(date: NaiveDate) -> Result<()> {
    let cfg = config::load_config()?;
    let run = build_orchestrator(&cfg)?.run_weekly(date).await?;
    report(&run);
    Ok(())
}

/// Print how a run ended; a failed run exits non-zero
fn report(run: &Run) {
    print_stages(run);

    match &run.state {
        RunState::Completed => {
            eprintln!("\n[{} run {} completed]", run.job, run.id);
        }
        RunState::Failed { error } => {
            eprintln!("\n[{} run {} failed: {}]", run.job, run.id, error);
            std::process::exit(1);
        }
        RunState::Running => {
            eprintln!("\n[{} run {} in state: {:?}]", run.job, run.id, run.state);
        }
    }
}

fn print_stages(run: &Run) {
    for stage in &run.stages {
        let status = format!("{:?}", stage.status).to_lowercase();
        match (&stage.output_ref, &stage.error) {
            (_, Some(error)) => println!("  {:<18} {:<10} {}", stage.name, status, error),
            (Some(output), None) => println!("  {:<18} {:<10} {}", stage.name, status, output),
            (None, None) => println!("  {:<18} {}", stage.name, status),
        }
    }
}

fn state_label(state: &RunState) -> &'static str {
    match state {
        RunState::Running => "running",
        RunState::Completed => "completed",
        RunState::Failed { .. } => "failed",
    }
}

/// Show the status of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let cfg = config::load_config()?;
    let run = load_run(&cfg.runs_dir(), run_id).await?;

    println!("Run ID: {}", run.id);
    println!("Job: {}", run.job);
    println!("Date: {}", run.label);
    println!("State: {}", state_label(&run.state));
    if let RunState::Failed { error } = &run.state {
        println!("Error: {}", error);
    }
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!("\nStages:");
    print_stages(&run);

    Ok(())
}

/// List recent runs
async fn show_runs(limit: usize) -> Result<()> {
    let cfg = config::load_config()?;
    let runs = list_runs(&cfg.runs_dir(), limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<8} {:<12} {:<10}", "RUN ID", "JOB", "DATE", "STATE");
    println!("{}", "-".repeat(70));

    for run in runs {
        println!(
            "{:<38} {:<8} {:<12} {:<10}",
            run.id,
            run.job,
            run.label,
            state_label(&run.state)
        );
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::load_config()?;

    println!("Daybook Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:    {}", cfg.home.display());
    println!("  Runs:    {}", cfg.runs_dir().display());
    println!("  Locks:   {}", cfg.locks_dir().display());
    println!("  Scratch: {}", cfg.scratch.display());
    println!();
    println!("Source:");
    println!("  Folder:   {}", cfg.source.folder);
    println!("  Patterns: {}", cfg.source.patterns.join(", "));
    println!("  Merged file extension: {}", cfg.audio_extension);
    println!();
    println!("Services:");
    println!("  OpenAI base URL:     {}", cfg.openai.base_url);
    println!("  Transcription:       {:?}", cfg.transcription.backend);
    println!("  Transcription model: {}", cfg.openai.transcription_model);
    println!("  Chat model:          {}", cfg.openai.chat_model);
    println!("  ffmpeg:              {} (timeout {}s)", cfg.ffmpeg.binary, cfg.ffmpeg.timeout_seconds);
    println!();
    println!("Stage policy overrides:");
    let overrides = serde_yaml::to_string(&cfg.stages).context("Failed to render stage policies")?;
    if overrides.trim() == "{}" {
        println!("  (using defaults)");
    } else {
        for line in overrides.lines() {
            println!("  {}", line);
        }
    }
    println!();
    println!("Credentials:");
    for name in [
        config::DROPBOX_TOKEN_ENV,
        config::GOOGLE_TOKEN_ENV,
        config::OPENAI_KEY_ENV,
    ] {
        let state = if std::env::var(name).is_ok() { "set" } else { "missing" };
        println!("  {}: {}", name, state);
    }

    Ok(())
}
