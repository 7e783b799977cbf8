//! Append-only run journal with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy debugging/inspection, one directory per run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Event, EventType};

/// File-based event store using JSONL format
pub struct EventStore {
    /// Path to the run's events.jsonl file
    events_path: PathBuf,
}

impl EventStore {
    /// Create or open the journal for a run under `runs_dir`
    pub async fn open(runs_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = runs_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");

        Ok(Self { events_path })
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open events file: {}",
                    self.events_path.display()
                )
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Check whether a stage with this idempotency key completed
    pub async fn is_stage_completed(&self, idempotency_key: &str) -> Result<bool> {
        let events = self.replay().await?;

        let completed = events.iter().any(|e| {
            e.idempotency_key == idempotency_key
                && matches!(e.event_type, EventType::StageCompleted)
        });

        Ok(completed)
    }

    /// List all run IDs under `runs_dir`
    pub async fn list_runs(runs_dir: &Path) -> Result<Vec<Uuid>> {
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(runs_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

/// Generate an idempotency key for a stage
pub fn generate_idempotency_key(run_id: Uuid, stage: &str, input: &str) -> String {
    let input_hash = hash_input(input);
    format!("{}:{}:{}", run_id, stage, input_hash)
}

/// Hash input content (first 16 chars of SHA256)
pub fn hash_input(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StageStatus;
    use tempfile::TempDir;

    async fn create_test_store() -> (EventStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = EventStore::open(temp_dir.path(), Uuid::new_v4())
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let (store, _temp) = create_test_store().await;
        let run_id = Uuid::new_v4();

        let event1 = Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("{}:start", run_id),
            "Daily run started".to_string(),
            StageStatus::Running,
        );

        let event2 = Event::new(
            run_id,
            Some("collect".to_string()),
            EventType::StageStarted,
            format!("{}:collect:abc", run_id),
            "Stage started".to_string(),
            StageStatus::Running,
        );

        store.append(&event1).await.unwrap();
        store.append(&event2).await.unwrap();

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[1].event_type, EventType::StageStarted);
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let (store, _temp) = create_test_store().await;
        assert!(store.replay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stage_completion_check() {
        let (store, _temp) = create_test_store().await;
        let run_id = Uuid::new_v4();
        let idem_key = generate_idempotency_key(run_id, "summarize", "03-14-2024");

        assert!(!store.is_stage_completed(&idem_key).await.unwrap());

        store
            .append(&Event::new(
                run_id,
                Some("summarize".to_string()),
                EventType::StageFailed,
                idem_key.clone(),
                "Stage failed".to_string(),
                StageStatus::Failed,
            ))
            .await
            .unwrap();
        assert!(!store.is_stage_completed(&idem_key).await.unwrap());

        store
            .append(&Event::new(
                run_id,
                Some("summarize".to_string()),
                EventType::StageCompleted,
                idem_key.clone(),
                "Stage completed".to_string(),
                StageStatus::Completed,
            ))
            .await
            .unwrap();
        assert!(store.is_stage_completed(&idem_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_runs_ignores_foreign_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        EventStore::open(temp_dir.path(), run_id).await.unwrap();
        std::fs::create_dir_all(temp_dir.path().join("not-a-run")).unwrap();

        let runs = EventStore::list_runs(temp_dir.path()).await.unwrap();
        assert_eq!(runs, vec![run_id]);
    }

    #[test]
    fn test_idempotency_key_format() {
        let run_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = generate_idempotency_key(run_id, "transcribe", "03-14-2024");

        assert!(key.starts_with("550e8400-e29b-41d4-a716-446655440000:transcribe:"));

        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 16);
    }

    #[test]
    fn test_input_hash_consistency() {
        let hash1 = hash_input("03-14-2024");
        let hash2 = hash_input("03-14-2024");
        let hash3 = hash_input("03-15-2024");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16);
    }
}
