//! Dropbox HTTP API client for the recordings folder.
//!
//! Endpoints: `files/list_folder` (+ `/continue`), `files/get_temporary_link`,
//! `files/delete_batch`. Auth: Bearer token.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{SourceEntry, SourceStore};

const DEFAULT_API_URL: &str = "https://api.dropboxapi.com/2";

/// Dropbox API client
pub struct DropboxClient {
    /// OAuth access token
    token: String,
    /// API base URL
    api_url: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response from `files/list_folder`
#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<ListEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    #[serde(default)]
    path_display: Option<String>,
    #[serde(default)]
    path_lower: Option<String>,
}

/// Response from `files/get_temporary_link`
#[derive(Debug, Deserialize)]
struct TemporaryLinkResponse {
    link: String,
}

impl DropboxClient {
    /// Create a new client against the public API
    pub fn new(token: String) -> Result<Self> {
        Self::with_api_url(token, DEFAULT_API_URL)
    }

    /// Create a client against a custom API base URL
    pub fn with_api_url(token: String, api_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build Dropbox HTTP client")?;

        Ok(Self {
            token,
            api_url: api_url.into(),
            client,
        })
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), method)
    }

    /// POST a JSON body and decode the JSON reply
    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to call Dropbox {}", method))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("Dropbox {} returned {}: {}", method, status, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Dropbox {} response", method))
    }
}

impl ListEntry {
    fn into_source_entry(self) -> SourceEntry {
        let path = self
            .path_display
            .or(self.path_lower)
            .unwrap_or_else(|| self.name.clone());

        SourceEntry {
            is_file: self.tag == "file",
            name: self.name,
            path,
        }
    }
}

#[async_trait]
impl SourceStore for DropboxClient {
    fn name(&self) -> &str {
        "dropbox"
    }

    async fn list(&self, folder: &str) -> Result<Vec<SourceEntry>> {
        let mut page: ListFolderResponse = self
            .rpc("files/list_folder", serde_json::json!({ "path": folder }))
            .await?;

        let mut entries: Vec<SourceEntry> = Vec::new();
        loop {
            entries.extend(page.entries.into_iter().map(ListEntry::into_source_entry));

            if !page.has_more {
                break;
            }

            debug!(count = entries.len(), "Fetching next Dropbox listing page");
            page = self
                .rpc(
                    "files/list_folder/continue",
                    serde_json::json!({ "cursor": page.cursor }),
                )
                .await?;
        }

        Ok(entries)
    }

    async fn temporary_link(&self, path: &str) -> Result<String> {
        let response: TemporaryLinkResponse = self
            .rpc("files/get_temporary_link", serde_json::json!({ "path": path }))
            .await?;
        Ok(response.link)
    }

    async fn download(&self, link: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(link)
            .send()
            .await
            .context("Failed to start download")?
            .error_for_status()
            .context("Download link rejected")?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download interrupted")?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn delete_batch(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let entries: Vec<serde_json::Value> = paths
            .iter()
            .map(|path| serde_json::json!({ "path": path }))
            .collect();

        // Dropbox answers with an async job id; completion is not polled
        let _: serde_json::Value = self
            .rpc(
                "files/delete_batch",
                serde_json::json!({ "entries": entries }),
            )
            .await?;

        Ok(())
    }
}
