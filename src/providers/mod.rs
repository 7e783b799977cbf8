//! Provider interfaces for external systems.
//!
//! Every collaborator the pipeline talks to sits behind one of these traits,
//! and a run receives them bundled in an explicitly constructed [`Services`]
//! value. Concrete HTTP and subprocess implementations live in the
//! submodules; `memory` holds in-process fakes for tests (behind the
//! `test-util` feature).

pub mod dropbox;
pub mod ffmpeg;
pub mod google;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod openai;
pub mod whisper;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Credentials, ResolvedConfig, TranscriptionBackend};
use crate::domain::{DocumentContent, FolderNode};

pub use dropbox::DropboxClient;
pub use ffmpeg::FfmpegMerger;
pub use google::GoogleWorkspaceClient;
pub use openai::OpenAiClient;
pub use whisper::LocalWhisper;

/// MIME type of a native document in the document store
pub const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";

/// MIME type of a folder in the document store
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// An entry listed from the source folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// File name (`memo1.m4a`)
    pub name: String,

    /// Full path, as the store expects it back
    pub path: String,

    /// False for sub-folders and other non-file entries
    pub is_file: bool,
}

/// A document listed from a folder in the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub id: String,
    pub name: String,
}

/// Storage holding the raw recordings
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// List the entries of a folder, in the store's listing order
    async fn list(&self, folder: &str) -> Result<Vec<SourceEntry>>;

    /// Resolve a time-limited download link for a path
    async fn temporary_link(&self, path: &str) -> Result<String>;

    /// Download a link's bytes to a local file, returning the byte count
    async fn download(&self, link: &str, dest: &Path) -> Result<u64>;

    /// Delete several paths in one request
    async fn delete_batch(&self, paths: &[String]) -> Result<()>;
}

/// Folder and document storage the journal is written into
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Non-trashed folders with exactly this name under `parent_id`; `None`
    /// means the top level of the store
    async fn find_folders(&self, name: &str, parent_id: Option<&str>) -> Result<Vec<FolderNode>>;

    /// Create a folder
    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderNode>;

    /// Upload a binary file into a folder, returning its id
    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String>;

    /// Create an empty document in a folder, returning its id
    async fn create_document(&self, name: &str, parent_id: &str) -> Result<String>;

    /// Append text to the end of a document
    async fn append_text(&self, document_id: &str, text: &str) -> Result<()>;

    /// Fetch a document's title and structured body
    async fn get_document(&self, document_id: &str) -> Result<DocumentContent>;

    /// Native documents in a folder whose name contains a marker, oldest first
    async fn list_documents(&self, parent_id: &str, name_contains: &str)
        -> Result<Vec<DocumentEntry>>;
}

/// Combines several recordings into one
#[async_trait]
pub trait AudioMerger: Send + Sync {
    fn name(&self) -> &str;

    /// Merge `inputs` in the given order into `output`
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// Speech-to-text
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String>;
}

/// Single-turn text completion
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// The collaborators a run needs, constructed once and passed in
#[derive(Clone)]
pub struct Services {
    pub sources: Arc<dyn SourceStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub merger: Arc<dyn AudioMerger>,
    pub transcriber: Arc<dyn Transcriber>,
    pub summarizer: Arc<dyn Summarizer>,
}

impl Services {
    /// Build the production providers from configuration and credentials
    pub fn from_config(config: &ResolvedConfig, credentials: &Credentials) -> Result<Self> {
        let openai = Arc::new(
            OpenAiClient::new(
                credentials.openai_api_key.clone(),
                config.openai.base_url.clone(),
                config.openai.transcription_model.clone(),
                config.openai.chat_model.clone(),
            )
            .context("Failed to build OpenAI client")?,
        );

        let transcriber: Arc<dyn Transcriber> = match config.transcription.backend {
            TranscriptionBackend::Openai => openai.clone(),
            TranscriptionBackend::Local => Arc::new(LocalWhisper::new(
                config.transcription.local_binary.clone(),
                config.transcription.local_model.clone(),
            )),
        };

        let mut documents = GoogleWorkspaceClient::new(credentials.google_access_token.clone())
            .context("Failed to build Google Workspace client")?;
        if let Some(ref base_url) = config.google.base_url {
            documents = documents.with_base_url(base_url);
        }

        Ok(Self {
            sources: Arc::new(
                DropboxClient::new(credentials.dropbox_access_token.clone())
                    .context("Failed to build Dropbox client")?,
            ),
            documents: Arc::new(documents),
            merger: Arc::new(FfmpegMerger::new(
                config.ffmpeg.binary.clone(),
                config.ffmpeg.timeout(),
            )),
            transcriber,
            summarizer: openai,
        })
    }
}

/// Guess a MIME type for an audio file from its extension
pub fn audio_mime_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "m4a" | "mp4" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_mime_type() {
        assert_eq!(audio_mime_type("03-14-2024.m4a"), "audio/mp4");
        assert_eq!(audio_mime_type("memo.MP3"), "audio/mpeg");
        assert_eq!(audio_mime_type("noext"), "application/octet-stream");
    }
}
