//! Merge stage: fetch every source item to scratch space, then merge in order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, instrument};

use super::error::PipelineError;
use crate::domain::{MergedArtifact, SourceItem};
use crate::providers::{AudioMerger, SourceStore};

/// Empty the scratch directory, creating it if needed
pub async fn prepare_scratch(dir: &Path) -> Result<(), PipelineError> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(dir).await.map_err(|e| {
            PipelineError::Scratch(format!("Failed to clear {}: {}", dir.display(), e))
        })?;
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::Scratch(format!("Failed to create {}: {}", dir.display(), e)))
}

/// Scratch path for the item at `index`. The prefix keeps names unique.
fn scratch_path(scratch: &Path, index: usize, item: &SourceItem) -> PathBuf {
    scratch.join(format!("{:03}-{}", index, item.name))
}

/// Download all items concurrently and wait for every one.
///
/// The returned paths follow `items` order, whatever order the downloads
/// finished in. Any failure fails the whole batch.
pub async fn download_all(
    sources: Arc<dyn SourceStore>,
    items: &[SourceItem],
    scratch: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let tasks: Vec<_> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let sources = Arc::clone(&sources);
            let link = item.download_link.clone();
            let dest = scratch_path(scratch, index, item);

            tokio::spawn(async move {
                let bytes = sources.download(&link, &dest).await?;
                Ok::<_, anyhow::Error>((dest, bytes))
            })
        })
        .collect();

    let results = join_all(tasks).await;

    let mut paths = Vec::with_capacity(items.len());
    for (item, result) in items.iter().zip(results) {
        match result {
            Ok(Ok((path, bytes))) => {
                debug!(item = %item.name, bytes, "Downloaded");
                paths.push(path);
            }
            Ok(Err(e)) => {
                return Err(PipelineError::Download {
                    item: item.name.clone(),
                    message: format!("{:#}", e),
                })
            }
            Err(e) => {
                return Err(PipelineError::Download {
                    item: item.name.clone(),
                    message: format!("download task failed: {}", e),
                })
            }
        }
    }

    Ok(paths)
}

/// Download `items` and merge them into `scratch/output_name`
#[instrument(skip(sources, merger, items, scratch), fields(items = items.len()))]
pub async fn merge_items(
    sources: Arc<dyn SourceStore>,
    merger: &dyn AudioMerger,
    items: &[SourceItem],
    scratch: &Path,
    output_name: &str,
) -> Result<MergedArtifact, PipelineError> {
    let inputs = download_all(sources, items, scratch).await?;
    let output = scratch.join(output_name);

    merger
        .merge(&inputs, &output)
        .await
        .map_err(|e| PipelineError::Merge(format!("{:#}", e)))?;

    info!(output = %output.display(), merger = merger.name(), "Merged recordings");
    Ok(MergedArtifact::new(output, output_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{ConcatMerger, MemorySourceStore};
    use std::time::Duration;
    use tempfile::TempDir;

    fn item(name: &str) -> SourceItem {
        SourceItem {
            name: name.to_string(),
            path: format!("/memos/{}", name),
            download_link: format!("memory:///memos/{}", name),
            origin: "/memos".to_string(),
        }
    }

    #[tokio::test]
    async fn test_prepare_scratch_clears_stale_files() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::write(scratch.join("stale.m4a"), b"old").unwrap();

        prepare_scratch(&scratch).await.unwrap();

        assert!(scratch.exists());
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_merge_order_ignores_download_completion_order() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemorySourceStore::new());
        store.add_slow_file("/memos", "a.m4a", b"A", Duration::from_millis(80));
        store.add_slow_file("/memos", "b.m4a", b"B", Duration::from_millis(40));
        store.add_file("/memos", "c.m4a", b"C");
        let items = vec![item("a.m4a"), item("b.m4a"), item("c.m4a")];
        let merger = ConcatMerger::new();

        let artifact = merge_items(store.clone(), &merger, &items, temp.path(), "03-14-2024.m4a")
            .await
            .unwrap();

        assert_eq!(std::fs::read(&artifact.local_path).unwrap(), b"ABC");
        assert_eq!(artifact.file_name, "03-14-2024.m4a");
        assert!(artifact.remote_id.is_none());
    }

    #[tokio::test]
    async fn test_failed_download_prevents_merge() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemorySourceStore::new());
        store.add_file("/memos", "a.m4a", b"A");
        store.add_file("/memos", "b.m4a", b"B");
        store.fail_download_of("b.m4a");
        let items = vec![item("a.m4a"), item("b.m4a")];
        let merger = ConcatMerger::new();

        let err = merge_items(store.clone(), &merger, &items, temp.path(), "out.m4a")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Download { ref item, .. } if item == "b.m4a"));
        assert!(merger.merges().is_empty());
    }

    #[tokio::test]
    async fn test_merger_error_is_merge_error() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemorySourceStore::new());
        store.add_file("/memos", "a.m4a", b"A");
        let merger = ConcatMerger::new();
        merger.fail_with("codec mismatch");

        let err = merge_items(store.clone(), &merger, &[item("a.m4a")], temp.path(), "out.m4a")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Merge(ref m) if m == "codec mismatch"));
    }
}
