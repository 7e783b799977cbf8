//! ffmpeg-based audio merger.
//!
//! Uses the concat demuxer with stream copy, so inputs must share a codec
//! (true for recordings from the same app).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::AudioMerger;

/// Merger that spawns `ffmpeg`
pub struct FfmpegMerger {
    /// Path to the ffmpeg binary (default: "ffmpeg")
    binary_path: String,
    /// Upper bound on a single merge
    merge_timeout: Duration,
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self::new("ffmpeg".to_string(), Duration::from_secs(600))
    }
}

impl FfmpegMerger {
    pub fn new(binary_path: String, merge_timeout: Duration) -> Self {
        Self {
            binary_path,
            merge_timeout,
        }
    }
}

/// Contents of a concat demuxer list file, one `file '<path>'` line per input
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| {
            let escaped = path.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

#[async_trait]
impl AudioMerger for FfmpegMerger {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            anyhow::bail!("Nothing to merge");
        }

        let list_path = output.with_extension("concat.txt");
        tokio::fs::write(&list_path, concat_list(inputs))
            .await
            .with_context(|| format!("Failed to write concat list: {}", list_path.display()))?;

        debug!(inputs = inputs.len(), output = %output.display(), "Running ffmpeg concat");

        let child = Command::new(&self.binary_path)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary_path))?;

        let result = timeout(self.merge_timeout, child.wait_with_output())
            .await
            .with_context(|| format!("ffmpeg timed out after {:?}", self.merge_timeout))?
            .context("Failed to wait for ffmpeg")?;

        let _ = tokio::fs::remove_file(&list_path).await;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let exit_code = result.status.code().unwrap_or(-1);
            anyhow::bail!(
                "ffmpeg failed with exit code {}: {}",
                exit_code,
                stderr.trim()
            );
        }

        Ok(())
    }
}
