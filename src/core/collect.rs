//! Ingestion: list pending recordings and resolve their download links.

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use tracing::{debug, info};

use super::error::PipelineError;
use crate::domain::SourceItem;
use crate::providers::SourceStore;

/// Patterns collected when none are configured
pub const DEFAULT_SOURCE_PATTERNS: &[&str] = &["*.m4a", "*.mp3", "*.wav", "*.ogg"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: true,
};

/// File-name filter for the source folder
#[derive(Debug, Clone)]
pub struct SourceFilter {
    patterns: Vec<Pattern>,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_SOURCE_PATTERNS
                .iter()
                .filter_map(|p| Pattern::new(p).ok())
                .collect(),
        }
    }
}

impl SourceFilter {
    /// Compile glob patterns; an empty list accepts every file
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref())
                    .with_context(|| format!("Invalid source pattern: {}", p.as_ref()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|p| p.matches_with(name, MATCH_OPTIONS))
    }
}

/// Collect the recordings waiting in `folder`, in listing order.
///
/// Fails with [`PipelineError::EmptyInput`] before any link is requested when
/// nothing matches.
pub async fn collect(
    sources: &dyn SourceStore,
    folder: &str,
    filter: &SourceFilter,
) -> Result<Vec<SourceItem>, PipelineError> {
    let entries = sources
        .list(folder)
        .await
        .with_context(|| format!("Failed to list {}", folder))?;

    let pending: Vec<_> = entries
        .into_iter()
        .filter(|entry| {
            let keep = entry.is_file && filter.matches(&entry.name);
            if !keep {
                debug!(entry = %entry.name, "Ignoring source entry");
            }
            keep
        })
        .collect();

    if pending.is_empty() {
        return Err(PipelineError::EmptyInput {
            folder: folder.to_string(),
        });
    }

    let mut items = Vec::with_capacity(pending.len());
    for entry in pending {
        let download_link = sources
            .temporary_link(&entry.path)
            .await
            .with_context(|| format!("Failed to get a download link for {}", entry.path))?;

        items.push(SourceItem {
            name: entry.name,
            path: entry.path,
            download_link,
            origin: folder.to_string(),
        });
    }

    info!(folder, count = items.len(), "Collected source items");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::MemorySourceStore;

    #[test]
    fn test_default_filter() {
        let filter = SourceFilter::default();
        assert!(filter.matches("memo1.m4a"));
        assert!(filter.matches("MEMO2.M4A"));
        assert!(filter.matches("call.wav"));
        assert!(!filter.matches("notes.txt"));
        assert!(!filter.matches(".hidden.m4a"));
    }

    #[test]
    fn test_empty_filter_accepts_all() {
        let filter = SourceFilter::new::<&str>(&[]).unwrap();
        assert!(filter.matches("anything.bin"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(SourceFilter::new(&["[m4a"]).is_err());
    }

    #[tokio::test]
    async fn test_collect_keeps_listing_order() {
        let store = MemorySourceStore::new();
        store.add_file("/voice-memos", "memo2.m4a", b"2");
        store.add_file("/voice-memos", "memo1.m4a", b"1");
        store.add_file("/voice-memos", "todo.txt", b"x");
        store.add_folder("/voice-memos", "archive");

        let items = collect(&store, "/voice-memos", &SourceFilter::default())
            .await
            .unwrap();

        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["memo2.m4a", "memo1.m4a"]);
        assert_eq!(items[0].download_link, "memory:///voice-memos/memo2.m4a");
        assert_eq!(items[0].origin, "/voice-memos");
    }

    #[tokio::test]
    async fn test_empty_folder_is_fatal_before_links() {
        let store = MemorySourceStore::new();
        store.add_file("/voice-memos", "readme.txt", b"x");

        let err = collect(&store, "/voice-memos", &SourceFilter::default())
            .await
            .unwrap_err();

        assert!(err.is_empty_input());
        assert_eq!(store.link_requests(), 0);
    }
}
