//! Daily Job Integration Tests
//!
//! Runs the whole daily job against the in-memory providers.

use std::time::Duration;

use chrono::NaiveDate;
use daybook::core::{JobSettings, Orchestrator};
use daybook::domain::{RunState, StageStatus};
use daybook::providers::memory::MemoryProviders;
use tempfile::TempDir;
use tokio_test::assert_ok;

const MEMOS: &str = "/voice-memos";

fn march_14() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
}

fn orchestrator(providers: &MemoryProviders, home: &TempDir) -> Orchestrator {
    Orchestrator::new(providers.services(), JobSettings::in_home(home.path()))
}

#[tokio::test]
async fn test_daily_run_end_to_end() {
    let home = TempDir::new().unwrap();
    let providers = MemoryProviders::new("I walked to the river.", "A calm day by the river.");
    providers.sources.add_file(MEMOS, "memo1.m4a", b"one-");
    providers.sources.add_file(MEMOS, "memo2.m4a", b"two");

    let run = assert_ok!(orchestrator(&providers, &home).run_daily(march_14()).await);
    assert_eq!(run.state, RunState::Completed);

    // 2024 at the root, week_11 under it
    let folders = providers.documents.folders();
    assert_eq!(folders.len(), 2);
    assert_eq!(folders[0].name, "2024");
    assert_eq!(folders[0].parent_id, None);
    assert_eq!(folders[1].name, "week_11");
    assert_eq!(folders[1].parent_id.as_deref(), Some(folders[0].id.as_str()));

    let week: Vec<_> = providers.documents.children(&folders[1].id);
    let names: Vec<&str> = week.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["03-14-2024.m4a", "03-14-2024-transcript", "03-14-2024-summary"]
    );
    assert_eq!(week[0].bytes, b"one-two");
    assert_eq!(week[0].mime_type, "audio/mp4");
    assert_eq!(week[1].text, "I walked to the river.");
    assert_eq!(week[2].text, "A calm day by the river.");

    // The transcriber saw the merged recording
    let received = providers.transcriber.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "03-14-2024.m4a");
    assert_eq!(received[0].1, b"one-two");

    assert_eq!(
        providers.summarizer.prompts(),
        vec!["Summarize this transcript into a daily journal entry: I walked to the river."]
    );

    assert_eq!(
        providers.sources.deleted(),
        vec!["/voice-memos/memo1.m4a", "/voice-memos/memo2.m4a"]
    );
    assert!(providers.sources.remaining(MEMOS).is_empty());

    for stage in [
        "collect",
        "resolve_folders",
        "merge",
        "upload",
        "transcribe",
        "store_transcript",
        "summarize",
        "store_summary",
        "cleanup",
    ] {
        assert_eq!(run.stage_status(stage), Some(StageStatus::Completed), "{}", stage);
    }
    assert_eq!(run.stage_output("upload"), Some(week[0].id.as_str()));
    assert_eq!(run.stage_output("store_summary"), Some(week[2].id.as_str()));
}

#[tokio::test]
async fn test_existing_folders_are_reused() {
    let home = TempDir::new().unwrap();
    let providers = MemoryProviders::default();
    let year = providers.documents.insert_folder("2024", None);
    let week = providers.documents.insert_folder("week_11", Some(&year.id));
    providers.sources.add_file(MEMOS, "memo1.m4a", b"x");

    let run = assert_ok!(orchestrator(&providers, &home).run_daily(march_14()).await);

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(providers.documents.call_count("create_folder"), 0);
    assert_eq!(run.stage_output("resolve_folders"), Some(week.id.as_str()));
    assert_eq!(providers.documents.children(&week.id).len(), 3);
}

#[tokio::test]
async fn test_merge_follows_listing_order_not_download_order() {
    let home = TempDir::new().unwrap();
    let providers = MemoryProviders::default();
    providers
        .sources
        .add_slow_file(MEMOS, "a.m4a", b"A", Duration::from_millis(60));
    providers
        .sources
        .add_slow_file(MEMOS, "b.m4a", b"B", Duration::from_millis(30));
    providers.sources.add_file(MEMOS, "c.m4a", b"C");

    let run = assert_ok!(orchestrator(&providers, &home).run_daily(march_14()).await);
    assert_eq!(run.state, RunState::Completed);

    let merges = providers.merger.merges();
    assert_eq!(merges.len(), 1);
    let inputs: Vec<String> = merges[0]
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(inputs, vec!["000-a.m4a", "001-b.m4a", "002-c.m4a"]);

    let upload = providers.documents.file_named("03-14-2024.m4a").unwrap();
    assert_eq!(upload.bytes, b"ABC");
}

#[tokio::test]
async fn test_empty_source_folder_fails_before_any_folder_call() {
    let home = TempDir::new().unwrap();
    let providers = MemoryProviders::default();
    providers.sources.add_file(MEMOS, "notes.txt", b"not audio");

    let run = assert_ok!(orchestrator(&providers, &home).run_daily(march_14()).await);

    match &run.state {
        RunState::Failed { error } => assert!(error.contains("No source items")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(providers.documents.calls().is_empty());
    assert!(providers.merger.merges().is_empty());
    assert!(providers.sources.deleted().is_empty());
    assert_eq!(run.stage_status("collect"), Some(StageStatus::Failed));
    assert_eq!(run.stage_status("resolve_folders"), None);
}

#[tokio::test]
async fn test_stale_scratch_files_are_cleared() {
    let home = TempDir::new().unwrap();
    let scratch = home.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("leftover.m4a"), b"stale").unwrap();

    let providers = MemoryProviders::default();
    providers.sources.add_file(MEMOS, "memo1.m4a", b"fresh");

    let run = assert_ok!(orchestrator(&providers, &home).run_daily(march_14()).await);

    assert_eq!(run.state, RunState::Completed);
    assert!(!scratch.join("leftover.m4a").exists());
    let upload = providers.documents.file_named("03-14-2024.m4a").unwrap();
    assert_eq!(upload.bytes, b"fresh");
}

#[tokio::test]
async fn test_nested_year_folder_is_not_reused() {
    let home = TempDir::new().unwrap();
    let providers = MemoryProviders::default();
    let photos = providers.documents.insert_folder("Photos", None);
    let decoy = providers.documents.insert_folder("2024", Some(&photos.id));
    providers.sources.add_file(MEMOS, "memo1.m4a", b"x");

    let run = assert_ok!(orchestrator(&providers, &home).run_daily(march_14()).await);
    assert_eq!(run.state, RunState::Completed);

    assert!(providers.documents.children(&decoy.id).is_empty());
    let year = providers
        .documents
        .folders()
        .into_iter()
        .find(|f| f.name == "2024" && f.parent_id.is_none())
        .unwrap();
    let week = providers
        .documents
        .folders()
        .into_iter()
        .find(|f| f.name == "week_11")
        .unwrap();
    assert_eq!(week.parent_id.as_deref(), Some(year.id.as_str()));
}

#[tokio::test]
async fn test_year_folders_filed_under_configured_root() {
    let home = TempDir::new().unwrap();
    let providers = MemoryProviders::default();
    let journals = providers.documents.insert_folder("journals", None);
    providers.sources.add_file(MEMOS, "memo1.m4a", b"x");

    let settings = JobSettings::in_home(home.path()).with_root_folder(journals.id.clone());
    let run = assert_ok!(
        Orchestrator::new(providers.services(), settings)
            .run_daily(march_14())
            .await
    );
    assert_eq!(run.state, RunState::Completed);

    let years: Vec<_> = providers
        .documents
        .folders()
        .into_iter()
        .filter(|f| f.name == "2024")
        .collect();
    assert_eq!(years.len(), 1);
    assert_eq!(years[0].parent_id.as_deref(), Some(journals.id.as_str()));
}
