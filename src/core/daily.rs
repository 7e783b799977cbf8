//! The daily job: collect, merge, upload, transcribe, summarize, clean up.

use anyhow::Context;
use tracing::{info, instrument};

use super::collect::collect;
use super::documents::write_document;
use super::error::PipelineError;
use super::folders::FolderResolver;
use super::merge::{merge_items, prepare_scratch};
use super::orchestrator::JobSettings;
use super::stage::{Stage, StageOutcome, StageRunner};
use crate::domain::{DocumentKind, MergedArtifact, SourceItem, TimeContext};
use crate::providers::{audio_mime_type, Services};

/// Build the daily summarization prompt
pub fn daily_prompt(transcript: &str) -> String {
    format!(
        "Summarize this transcript into a daily journal entry: {}",
        transcript
    )
}

/// Upload the merged recording into the week folder
async fn upload_artifact(
    services: &Services,
    artifact: MergedArtifact,
    folder_id: &str,
) -> Result<MergedArtifact, PipelineError> {
    let bytes = tokio::fs::read(&artifact.local_path)
        .await
        .with_context(|| format!("Failed to read {}", artifact.local_path.display()))?;

    let id = services
        .documents
        .upload_file(
            &artifact.file_name,
            folder_id,
            audio_mime_type(&artifact.file_name),
            bytes,
        )
        .await?;

    Ok(artifact.uploaded(id))
}

async fn transcribe(services: &Services, artifact: &MergedArtifact) -> Result<String, PipelineError> {
    let audio = tokio::fs::read(&artifact.local_path)
        .await
        .with_context(|| format!("Failed to read {}", artifact.local_path.display()))?;

    Ok(services
        .transcriber
        .transcribe(&artifact.file_name, audio)
        .await?)
}

async fn delete_sources(services: &Services, items: &[SourceItem]) -> Result<(), PipelineError> {
    let paths: Vec<String> = items.iter().map(|item| item.path.clone()).collect();
    services.sources.delete_batch(&paths).await?;
    info!(count = paths.len(), "Deleted source items");
    Ok(())
}

/// Keep a non-blank completed text, or explain why there is none
fn usable_text(outcome: StageOutcome<String>, what: &str) -> Result<String, String> {
    match outcome {
        StageOutcome::Completed(text) if !text.trim().is_empty() => Ok(text),
        StageOutcome::Completed(_) => Err(format!("{} was empty", what)),
        StageOutcome::Failed(_) => Err(format!("{} failed", what)),
        StageOutcome::Skipped(_) => Err(format!("{} was skipped", what)),
    }
}

/// Run every daily stage for `time`.
///
/// Precondition stages (collect, folder resolution, merge) end the run on
/// failure. After that each stage's policy decides; a stage whose input is
/// missing is skipped. Source items are deleted only once the summary is
/// stored.
#[instrument(skip_all, fields(date = %time.formatted_date, week = time.week_number))]
pub(crate) async fn run(
    runner: &mut StageRunner<'_>,
    services: &Services,
    settings: &JobSettings,
    time: &TimeContext,
) -> Result<(), PipelineError> {
    let date = time.formatted_date.as_str();

    prepare_scratch(&settings.scratch_dir).await?;

    let items = runner
        .require(
            Stage::Collect,
            &settings.source_folder,
            collect(
                services.sources.as_ref(),
                &settings.source_folder,
                &settings.source_filter,
            ),
        )
        .await?;

    let folders = runner
        .require(Stage::ResolveFolders, date, async {
            FolderResolver::new(services.documents.as_ref())
                .with_root(settings.root_folder_id.as_deref())
                .resolve_week(time)
                .await
                .map_err(PipelineError::from)
        })
        .await?;

    let artifact = runner
        .require(
            Stage::Merge,
            date,
            merge_items(
                services.sources.clone(),
                services.merger.as_ref(),
                &items,
                &settings.scratch_dir,
                &time.audio_file_name(&settings.audio_extension),
            ),
        )
        .await?;

    let uploaded = runner
        .execute(
            Stage::Upload,
            date,
            upload_artifact(services, artifact, &folders.week.id),
        )
        .await?;

    let transcript = match uploaded.as_completed() {
        Some(artifact) => {
            runner
                .execute(Stage::Transcribe, date, transcribe(services, artifact))
                .await?
        }
        None => {
            runner
                .skip(Stage::Transcribe, date, "merged recording was not uploaded")
                .await?
        }
    };

    let transcript = usable_text(transcript, "transcription");

    match &transcript {
        Ok(text) => {
            runner
                .execute(
                    Stage::StoreTranscript,
                    date,
                    async {
                        write_document(
                            services.documents.as_ref(),
                            &folders.week.id,
                            &time.transcript_title(),
                            text,
                            DocumentKind::Transcript,
                        )
                        .await
                        .map_err(PipelineError::from)
                    },
                )
                .await?;
        }
        Err(reason) => {
            runner
                .skip::<()>(Stage::StoreTranscript, date, reason)
                .await?;
        }
    }

    let summary = match &transcript {
        Ok(text) => {
            runner
                .execute(Stage::Summarize, date, async {
                    services
                        .summarizer
                        .complete(&daily_prompt(text))
                        .await
                        .map_err(PipelineError::from)
                })
                .await?
        }
        Err(reason) => runner.skip(Stage::Summarize, date, reason).await?,
    };

    let stored_summary = match usable_text(summary, "summary") {
        Ok(text) => {
            runner
                .execute(Stage::StoreSummary, date, async {
                    write_document(
                        services.documents.as_ref(),
                        &folders.week.id,
                        &time.summary_title(),
                        &text,
                        DocumentKind::Summary,
                    )
                    .await
                    .map_err(PipelineError::from)
                })
                .await?
        }
        Err(reason) => runner.skip(Stage::StoreSummary, date, &reason).await?,
    };

    if stored_summary.is_completed() {
        runner
            .execute(Stage::Cleanup, date, delete_sources(services, &items))
            .await?;
    } else {
        runner
            .skip::<()>(Stage::Cleanup, date, "summary was not stored")
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_prompt() {
        assert_eq!(
            daily_prompt("walked the dog"),
            "Summarize this transcript into a daily journal entry: walked the dog"
        );
    }

    #[test]
    fn test_usable_text() {
        assert_eq!(
            usable_text(StageOutcome::Completed("hi".to_string()), "transcription"),
            Ok("hi".to_string())
        );
        assert_eq!(
            usable_text(StageOutcome::Completed("  \n".to_string()), "transcription"),
            Err("transcription was empty".to_string())
        );
        assert_eq!(
            usable_text(StageOutcome::Failed("503".to_string()), "transcription"),
            Err("transcription failed".to_string())
        );
    }
}
