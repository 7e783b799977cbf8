//! Local Whisper transcription backend.
//!
//! Shells out to a local whisper binary for transcription.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::Transcriber;

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
}

/// Transcriber backed by a local `whisper` binary
pub struct LocalWhisper {
    binary: PathBuf,
    model: String,
}

impl LocalWhisper {
    pub fn new(binary: PathBuf, model: String) -> Self {
        Self { binary, model }
    }
}

#[async_trait]
impl Transcriber for LocalWhisper {
    fn name(&self) -> &str {
        "local-whisper"
    }

    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String> {
        // Whisper reads from and writes to disk
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;
        let audio_path = temp_dir.path().join(file_name);
        tokio::fs::write(&audio_path, &audio)
            .await
            .context("Failed to stage audio for whisper")?;

        let output = Command::new(&self.binary)
            .arg(&audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run whisper at {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Whisper failed: {}", stderr.trim());
        }

        let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .context("Failed to read whisper output")?;

        let whisper: WhisperOutput =
            serde_json::from_str(&json_content).context("Failed to parse whisper JSON")?;

        Ok(whisper.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let whisper = LocalWhisper::new(
            PathBuf::from("/nonexistent/whisper-binary"),
            "base".to_string(),
        );
        let result = whisper.transcribe("memo.m4a", b"audio".to_vec()).await;
        assert!(result.is_err());
    }
}
