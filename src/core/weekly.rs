//! The weekly job: fold the week's daily summaries into one document.

use tracing::{info, instrument};

use super::documents::write_document;
use super::error::PipelineError;
use super::folders::FolderResolver;
use super::orchestrator::JobSettings;
use super::stage::{Stage, StageRunner};
use crate::domain::time::{is_weekly_summary_title, SUMMARY_SUFFIX};
use crate::domain::{DocumentContent, DocumentKind, TimeContext};
use crate::providers::Services;

/// Line written between two daily entries
pub const ENTRY_DIVIDER: &str = "\n--------------------\n";

/// Build the weekly summarization prompt
pub fn weekly_prompt(text: &str) -> String {
    format!(
        "Summarize these daily journal entries into a long-form weekly summary: {}",
        text
    )
}

/// Concatenate daily summaries, each headed by its title minus the first
/// `-summary` marker
pub fn build_weekly_text(documents: &[DocumentContent]) -> String {
    let mut parts: Vec<String> = Vec::new();

    for document in documents {
        let header = document.title.replacen(SUMMARY_SUFFIX, "", 1);
        parts.push(format!("\n{}\n", header));
        parts.extend(document.text_runs().map(str::to_string));
        parts.push(ENTRY_DIVIDER.to_string());
    }

    parts.join("\n")
}

/// Fetch the week's daily summaries in creation order.
///
/// A previous weekly summary in the same folder is left out.
async fn gather_summaries(
    services: &Services,
    week_folder_id: &str,
) -> Result<Vec<DocumentContent>, PipelineError> {
    let entries = services
        .documents
        .list_documents(week_folder_id, SUMMARY_SUFFIX)
        .await?;

    let mut documents = Vec::with_capacity(entries.len());
    for entry in entries {
        if is_weekly_summary_title(&entry.name) {
            continue;
        }
        documents.push(services.documents.get_document(&entry.id).await?);
    }

    Ok(documents)
}

/// Run every weekly stage for `time`.
///
/// A missing week folder, or a week with no daily summaries, ends the run
/// quietly without a summarization request.
#[instrument(skip_all, fields(year = time.year, week = time.week_number))]
pub(crate) async fn run(
    runner: &mut StageRunner<'_>,
    services: &Services,
    settings: &JobSettings,
    time: &TimeContext,
) -> Result<(), PipelineError> {
    let week_label = time.week_folder_name();
    let label = week_label.as_str();

    let folders = runner
        .require(Stage::LocateWeek, label, async {
            FolderResolver::new(services.documents.as_ref())
                .with_root(settings.root_folder_id.as_deref())
                .find_week(time)
                .await
                .map_err(PipelineError::from)
        })
        .await?;

    let Some(folders) = folders else {
        info!(folder = label, "No folder for this week, nothing to aggregate");
        for stage in [Stage::GatherSummaries, Stage::Aggregate, Stage::StoreWeekly] {
            runner.skip::<()>(stage, label, "week folder not found").await?;
        }
        return Ok(());
    };

    let documents = runner
        .require(
            Stage::GatherSummaries,
            label,
            gather_summaries(services, &folders.week.id),
        )
        .await?;

    if documents.is_empty() {
        info!(folder = label, "No daily summaries this week");
        for stage in [Stage::Aggregate, Stage::StoreWeekly] {
            runner.skip::<()>(stage, label, "no daily summaries").await?;
        }
        return Ok(());
    }

    let text = build_weekly_text(&documents);
    let summary = runner
        .execute(Stage::Aggregate, label, async {
            services
                .summarizer
                .complete(&weekly_prompt(&text))
                .await
                .map_err(PipelineError::from)
        })
        .await?;

    match summary.completed() {
        Some(summary) => {
            runner
                .execute(Stage::StoreWeekly, label, async {
                    write_document(
                        services.documents.as_ref(),
                        &folders.week.id,
                        &time.weekly_summary_title(),
                        &summary,
                        DocumentKind::WeeklySummary,
                    )
                    .await
                    .map_err(PipelineError::from)
                })
                .await?;
        }
        None => {
            runner
                .skip::<()>(Stage::StoreWeekly, label, "weekly summary failed")
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekly_text_layout() {
        let documents = vec![
            DocumentContent::from_text("03-11-2024-summary", "Monday.\n"),
            DocumentContent::from_text("03-12-2024-summary", "Tuesday.\nLate night.\n"),
        ];

        let text = build_weekly_text(&documents);

        assert_eq!(
            text,
            "\n03-11-2024\n\nMonday.\n\n\n--------------------\n\n\
             \n03-12-2024\n\nTuesday.\n\nLate night.\n\n\n--------------------\n"
        );
    }

    #[test]
    fn test_header_drops_first_marker_anywhere() {
        let documents = vec![
            DocumentContent::from_text("03-11-2024-summary (1)", "x"),
            DocumentContent::from_text("notes", "y"),
        ];
        let text = build_weekly_text(&documents);
        assert!(text.starts_with("\n03-11-2024 (1)\n"));
        assert!(text.contains("\nnotes\n"));
    }

    #[test]
    fn test_weekly_prompt() {
        assert_eq!(
            weekly_prompt("entries"),
            "Summarize these daily journal entries into a long-form weekly summary: entries"
        );
    }
}
