//! In-process providers.
//!
//! Every trait in [`super`] has an implementation here that keeps its state in
//! memory, records the calls it receives and can be told to fail. The
//! orchestrator tests run whole daily and weekly jobs against these.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{
    AudioMerger, DocumentEntry, DocumentStore, Services, SourceEntry, SourceStore, Summarizer,
    Transcriber, DOCUMENT_MIME_TYPE, FOLDER_MIME_TYPE,
};
use crate::domain::{DocumentContent, FolderNode};

const LINK_SCHEME: &str = "memory://";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn join_path(folder: &str, name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), name)
}

// ============================================================================
// Source store
// ============================================================================

#[derive(Debug, Clone)]
struct SourceFile {
    folder: String,
    name: String,
    bytes: Vec<u8>,
    is_file: bool,
    delay: Duration,
}

#[derive(Debug, Default)]
struct SourceState {
    files: Vec<SourceFile>,
    deleted: Vec<String>,
    link_requests: usize,
    list_requests: usize,
    failing_downloads: HashSet<String>,
    fail_deletes: bool,
}

/// Source folder held in memory
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    state: Mutex<SourceState>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recording to a folder
    pub fn add_file(&self, folder: &str, name: &str, bytes: &[u8]) {
        lock(&self.state).files.push(SourceFile {
            folder: folder.to_string(),
            name: name.to_string(),
            bytes: bytes.to_vec(),
            is_file: true,
            delay: Duration::ZERO,
        });
    }

    /// Add a recording whose download takes `delay` to finish
    pub fn add_slow_file(&self, folder: &str, name: &str, bytes: &[u8], delay: Duration) {
        self.add_file(folder, name, bytes);
        if let Some(file) = lock(&self.state).files.last_mut() {
            file.delay = delay;
        }
    }

    /// Add a sub-folder entry
    pub fn add_folder(&self, folder: &str, name: &str) {
        lock(&self.state).files.push(SourceFile {
            folder: folder.to_string(),
            name: name.to_string(),
            bytes: Vec::new(),
            is_file: false,
            delay: Duration::ZERO,
        });
    }

    /// Make downloads of the named file fail
    pub fn fail_download_of(&self, name: &str) {
        lock(&self.state).failing_downloads.insert(name.to_string());
    }

    /// Make every batch delete fail
    pub fn fail_deletes(&self) {
        lock(&self.state).fail_deletes = true;
    }

    /// Paths removed by `delete_batch`, in request order
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.state).deleted.clone()
    }

    /// Names of files still present in a folder
    pub fn remaining(&self, folder: &str) -> Vec<String> {
        lock(&self.state)
            .files
            .iter()
            .filter(|f| f.is_file && f.folder == folder)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Number of temporary links handed out
    pub fn link_requests(&self) -> usize {
        lock(&self.state).link_requests
    }

    /// Number of folder listings served
    pub fn list_requests(&self) -> usize {
        lock(&self.state).list_requests
    }
}

#[async_trait]
impl SourceStore for MemorySourceStore {
    fn name(&self) -> &str {
        "memory-source"
    }

    async fn list(&self, folder: &str) -> Result<Vec<SourceEntry>> {
        let mut state = lock(&self.state);
        state.list_requests += 1;

        Ok(state
            .files
            .iter()
            .filter(|f| f.folder == folder)
            .map(|f| SourceEntry {
                name: f.name.clone(),
                path: join_path(&f.folder, &f.name),
                is_file: f.is_file,
            })
            .collect())
    }

    async fn temporary_link(&self, path: &str) -> Result<String> {
        let mut state = lock(&self.state);
        if !state
            .files
            .iter()
            .any(|f| f.is_file && join_path(&f.folder, &f.name) == path)
        {
            anyhow::bail!("No such file: {}", path);
        }
        state.link_requests += 1;
        Ok(format!("{}{}", LINK_SCHEME, path))
    }

    async fn download(&self, link: &str, dest: &Path) -> Result<u64> {
        let path = link
            .strip_prefix(LINK_SCHEME)
            .with_context(|| format!("Not a memory link: {}", link))?;

        let file = {
            let state = lock(&self.state);
            let file = state
                .files
                .iter()
                .find(|f| join_path(&f.folder, &f.name) == path)
                .cloned()
                .with_context(|| format!("Link expired: {}", link))?;
            if state.failing_downloads.contains(&file.name) {
                anyhow::bail!("Download of {} failed", file.name);
            }
            file
        };

        if !file.delay.is_zero() {
            tokio::time::sleep(file.delay).await;
        }

        tokio::fs::write(dest, &file.bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(file.bytes.len() as u64)
    }

    async fn delete_batch(&self, paths: &[String]) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_deletes {
            anyhow::bail!("Batch delete rejected");
        }

        state
            .files
            .retain(|f| !paths.contains(&join_path(&f.folder, &f.name)));
        state.deleted.extend(paths.iter().cloned());
        Ok(())
    }
}

// ============================================================================
// Document store
// ============================================================================

/// A file or folder held by [`MemoryDocumentStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub text: String,
    pub trashed: bool,
    /// Creation sequence number, used for listing order
    pub created: i64,
}

#[derive(Debug, Default)]
struct DocumentState {
    next_id: u64,
    files: Vec<MemoryFile>,
    calls: Vec<String>,
    failing_names: HashSet<String>,
    fail_uploads: bool,
}

impl DocumentState {
    fn insert(&mut self, name: &str, parent_id: Option<&str>, mime_type: &str, bytes: Vec<u8>) -> MemoryFile {
        self.next_id += 1;
        let file = MemoryFile {
            id: format!("mem-{}", self.next_id),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
            mime_type: mime_type.to_string(),
            bytes,
            text: String::new(),
            trashed: false,
            created: self.next_id as i64,
        };
        self.files.push(file.clone());
        file
    }
}

/// Folder and document store held in memory
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<DocumentState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a folder directly, bypassing call recording
    pub fn insert_folder(&self, name: &str, parent_id: Option<&str>) -> FolderNode {
        let file = lock(&self.state).insert(name, parent_id, FOLDER_MIME_TYPE, Vec::new());
        FolderNode {
            name: file.name,
            id: file.id,
            parent_id: file.parent_id,
        }
    }

    /// Create a document with text directly, bypassing call recording
    pub fn insert_document(&self, parent_id: &str, name: &str, text: &str) -> String {
        let mut state = lock(&self.state);
        let id = state
            .insert(name, Some(parent_id), DOCUMENT_MIME_TYPE, Vec::new())
            .id;
        if let Some(file) = state.files.iter_mut().find(|f| f.id == id) {
            file.text = text.to_string();
        }
        id
    }

    /// Move a file or folder to the trash
    pub fn trash(&self, id: &str) {
        if let Some(file) = lock(&self.state).files.iter_mut().find(|f| f.id == id) {
            file.trashed = true;
        }
    }

    /// Make `create_document` fail for this name
    pub fn fail_create_document(&self, name: &str) {
        lock(&self.state).failing_names.insert(name.to_string());
    }

    /// Make every upload fail
    pub fn fail_uploads(&self) {
        lock(&self.state).fail_uploads = true;
    }

    /// Operation names in call order (`find_folders`, `create_document`, ...)
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls to one operation
    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// All folders, in creation order
    pub fn folders(&self) -> Vec<FolderNode> {
        lock(&self.state)
            .files
            .iter()
            .filter(|f| f.mime_type == FOLDER_MIME_TYPE)
            .map(|f| FolderNode {
                name: f.name.clone(),
                id: f.id.clone(),
                parent_id: f.parent_id.clone(),
            })
            .collect()
    }

    /// Non-folder entries under a parent, in creation order
    pub fn children(&self, parent_id: &str) -> Vec<MemoryFile> {
        lock(&self.state)
            .files
            .iter()
            .filter(|f| f.mime_type != FOLDER_MIME_TYPE && f.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect()
    }

    /// First file with this name, anywhere
    pub fn file_named(&self, name: &str) -> Option<MemoryFile> {
        lock(&self.state)
            .files
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }

    fn record(&self, operation: &str) -> MutexGuard<'_, DocumentState> {
        let mut state = lock(&self.state);
        state.calls.push(operation.to_string());
        state
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory-documents"
    }

    async fn find_folders(&self, name: &str, parent_id: Option<&str>) -> Result<Vec<FolderNode>> {
        let state = self.record("find_folders");
        Ok(state
            .files
            .iter()
            .filter(|f| f.mime_type == FOLDER_MIME_TYPE && !f.trashed && f.name == name)
            .filter(|f| f.parent_id.as_deref() == parent_id)
            .map(|f| FolderNode {
                name: f.name.clone(),
                id: f.id.clone(),
                parent_id: f.parent_id.clone(),
            })
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderNode> {
        let mut state = self.record("create_folder");
        let file = state.insert(name, parent_id, FOLDER_MIME_TYPE, Vec::new());
        Ok(FolderNode {
            name: file.name,
            id: file.id,
            parent_id: file.parent_id,
        })
    }

    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let mut state = self.record("upload_file");
        if state.fail_uploads {
            anyhow::bail!("Upload of {} rejected", name);
        }
        Ok(state.insert(name, Some(parent_id), mime_type, bytes).id)
    }

    async fn create_document(&self, name: &str, parent_id: &str) -> Result<String> {
        let mut state = self.record("create_document");
        if state.failing_names.contains(name) {
            anyhow::bail!("Quota exceeded creating {}", name);
        }
        Ok(state
            .insert(name, Some(parent_id), DOCUMENT_MIME_TYPE, Vec::new())
            .id)
    }

    async fn append_text(&self, document_id: &str, text: &str) -> Result<()> {
        let mut state = self.record("append_text");
        let file = state
            .files
            .iter_mut()
            .find(|f| f.id == document_id)
            .with_context(|| format!("No such document: {}", document_id))?;
        file.text.push_str(text);
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<DocumentContent> {
        let state = self.record("get_document");
        let file = state
            .files
            .iter()
            .find(|f| f.id == document_id)
            .with_context(|| format!("No such document: {}", document_id))?;
        Ok(DocumentContent::from_text(file.name.clone(), &file.text))
    }

    async fn list_documents(&self, parent_id: &str, name_contains: &str) -> Result<Vec<DocumentEntry>> {
        let state = self.record("list_documents");
        let mut entries: Vec<&MemoryFile> = state
            .files
            .iter()
            .filter(|f| {
                f.mime_type == DOCUMENT_MIME_TYPE
                    && !f.trashed
                    && f.parent_id.as_deref() == Some(parent_id)
                    && f.name.contains(name_contains)
            })
            .collect();
        entries.sort_by_key(|f| f.created);

        Ok(entries
            .into_iter()
            .map(|f| DocumentEntry {
                id: f.id.clone(),
                name: f.name.clone(),
            })
            .collect())
    }
}

// ============================================================================
// Merger, transcriber, summarizer
// ============================================================================

/// Merger that concatenates input bytes in order
#[derive(Debug, Default)]
pub struct ConcatMerger {
    failure: Mutex<Option<String>>,
    merges: Mutex<Vec<Vec<PathBuf>>>,
}

impl ConcatMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every merge fail with this message
    pub fn fail_with(&self, message: &str) {
        *lock(&self.failure) = Some(message.to_string());
    }

    /// Inputs of each merge call
    pub fn merges(&self) -> Vec<Vec<PathBuf>> {
        lock(&self.merges).clone()
    }
}

#[async_trait]
impl AudioMerger for ConcatMerger {
    fn name(&self) -> &str {
        "concat"
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        lock(&self.merges).push(inputs.to_vec());
        let failure = lock(&self.failure).clone();
        if let Some(message) = failure {
            anyhow::bail!("{}", message);
        }

        let mut merged = Vec::new();
        for input in inputs {
            merged.extend(
                tokio::fs::read(input)
                    .await
                    .with_context(|| format!("Missing merge input {}", input.display()))?,
            );
        }
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

/// Transcriber returning a scripted reply
#[derive(Debug)]
pub struct ScriptedTranscriber {
    reply: Mutex<Result<String, String>>,
    received: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedTranscriber {
    pub fn new(text: &str) -> Self {
        Self {
            reply: Mutex::new(Ok(text.to_string())),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_with(&self, message: &str) {
        *lock(&self.reply) = Err(message.to_string());
    }

    /// File names and audio bytes received, in call order
    pub fn received(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.received).clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    fn name(&self) -> &str {
        "scripted-transcriber"
    }

    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String> {
        lock(&self.received).push((file_name.to_string(), audio));
        lock(&self.reply).clone().map_err(|message| anyhow::anyhow!(message))
    }
}

/// Summarizer returning a scripted reply
#[derive(Debug)]
pub struct ScriptedSummarizer {
    reply: Mutex<Result<String, String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSummarizer {
    pub fn new(text: &str) -> Self {
        Self {
            reply: Mutex::new(Ok(text.to_string())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_with(&self, message: &str) {
        *lock(&self.reply) = Err(message.to_string());
    }

    /// Prompts received, in call order
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    fn name(&self) -> &str {
        "scripted-summarizer"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.reply).clone().map_err(|message| anyhow::anyhow!(message))
    }
}

/// A full set of in-memory providers with handles kept for inspection
#[derive(Clone)]
pub struct MemoryProviders {
    pub sources: Arc<MemorySourceStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub merger: Arc<ConcatMerger>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub summarizer: Arc<ScriptedSummarizer>,
}

impl Default for MemoryProviders {
    fn default() -> Self {
        Self::new("transcript text", "summary text")
    }
}

impl MemoryProviders {
    /// Providers whose transcriber and summarizer answer with fixed text
    pub fn new(transcript: &str, summary: &str) -> Self {
        Self {
            sources: Arc::new(MemorySourceStore::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
            merger: Arc::new(ConcatMerger::new()),
            transcriber: Arc::new(ScriptedTranscriber::new(transcript)),
            summarizer: Arc::new(ScriptedSummarizer::new(summary)),
        }
    }

    /// The providers as a run context
    pub fn services(&self) -> Services {
        Services {
            sources: self.sources.clone(),
            documents: self.documents.clone(),
            merger: self.merger.clone(),
            transcriber: self.transcriber.clone(),
            summarizer: self.summarizer.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_source_listing_and_delete() {
        let store = MemorySourceStore::new();
        store.add_file("/memos", "a.m4a", b"A");
        store.add_file("/memos", "b.m4a", b"B");
        store.add_file("/other", "c.m4a", b"C");

        let entries = store.list("/memos").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/memos/a.m4a");

        store
            .delete_batch(&["/memos/a.m4a".to_string()])
            .await
            .unwrap();
        assert_eq!(store.remaining("/memos"), vec!["b.m4a".to_string()]);
        assert_eq!(store.deleted(), vec!["/memos/a.m4a".to_string()]);
    }

    #[tokio::test]
    async fn test_trashed_folders_are_not_found() {
        let store = MemoryDocumentStore::new();
        let folder = store.insert_folder("2024", None);
        store.trash(&folder.id);

        assert!(store.find_folders("2024", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_documents_listed_oldest_first() {
        let store = MemoryDocumentStore::new();
        let week = store.insert_folder("week_11", None);
        store.insert_document(&week.id, "03-12-2024-summary", "b");
        store.insert_document(&week.id, "03-12-2024-transcript", "x");
        store.insert_document(&week.id, "03-13-2024-summary", "c");

        let docs = store.list_documents(&week.id, "-summary").await.unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["03-12-2024-summary", "03-13-2024-summary"]);
    }

    #[tokio::test]
    async fn test_uploads_are_not_listed_as_documents() {
        let store = MemoryDocumentStore::new();
        let week = store.insert_folder("week_11", None);
        store.insert_document(&week.id, "03-12-2024-summary", "b");
        store
            .upload_file("03-12-2024-summary.pdf", &week.id, "application/pdf", b"%PDF".to_vec())
            .await
            .unwrap();

        let docs = store.list_documents(&week.id, "-summary").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "03-12-2024-summary");
    }

    #[tokio::test]
    async fn test_no_parent_means_top_level_only() {
        let store = MemoryDocumentStore::new();
        let photos = store.insert_folder("Photos", None);
        store.insert_folder("2024", Some(&photos.id));

        assert!(store.find_folders("2024", None).await.unwrap().is_empty());

        let top = store.insert_folder("2024", None);
        let found = store.find_folders("2024", None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, top.id);
    }
}
