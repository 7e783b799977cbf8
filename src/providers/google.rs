//! Google Drive v3 + Docs v1 client for the journal folders and documents.
//!
//! Auth: Bearer access token. Obtaining and refreshing the token is left to
//! whatever schedules the jobs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::{DocumentEntry, DocumentStore, DOCUMENT_MIME_TYPE, FOLDER_MIME_TYPE};
use crate::domain::{DocumentContent, FolderNode};

const DRIVE_URL: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
const DOCS_URL: &str = "https://docs.googleapis.com/v1";

/// Google Drive + Docs client
pub struct GoogleWorkspaceClient {
    token: String,
    drive_url: String,
    upload_url: String,
    docs_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    parents: Vec<String>,
}

impl GoogleWorkspaceClient {
    /// Create a client against the public Google endpoints
    pub fn new(token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build Google HTTP client")?;

        Ok(Self {
            token,
            drive_url: DRIVE_URL.to_string(),
            upload_url: UPLOAD_URL.to_string(),
            docs_url: DOCS_URL.to_string(),
            client,
        })
    }

    /// Point every endpoint at one base URL (local emulators)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.drive_url = format!("{}/drive/v3", base);
        self.upload_url = format!("{}/upload/drive/v3", base);
        self.docs_url = format!("{}/v1", base);
        self
    }

    /// Send a request and decode its JSON reply, turning HTTP errors into context
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to call Google API: {}", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("Google API {} returned {}: {}", what, status, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Google API response: {}", what))
    }

    /// Run a Drive `files.list` query, following page tokens
    async fn query_files(&self, query: &str, order_by: Option<&str>) -> Result<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("q", query.to_string()),
                ("fields", "nextPageToken,files(id,name,parents)".to_string()),
                ("pageSize", "100".to_string()),
            ];
            if let Some(order) = order_by {
                params.push(("orderBy", order.to_string()));
            }
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let request = self
                .client
                .get(format!("{}/files", self.drive_url))
                .query(&params);
            let page: FileList = self.send_json(request, "files.list").await?;

            files.extend(page.files);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(query, count = files.len(), "Drive query");
        Ok(files)
    }

    async fn create_file(&self, name: &str, mime_type: &str, parent_id: Option<&str>) -> Result<DriveFile> {
        let mut metadata = serde_json::json!({ "name": name, "mimeType": mime_type });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let request = self
            .client
            .post(format!("{}/files", self.drive_url))
            .query(&[("fields", "id,name,parents")])
            .json(&metadata);
        self.send_json(request, "files.create").await
    }
}

/// Quote a value for use inside a Drive query string literal
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Drive query for non-trashed folders named `name` under `parent_id`, or
/// under My Drive's root when no parent is given
pub fn folder_query(name: &str, parent_id: Option<&str>) -> String {
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false and '{}' in parents",
        escape_query_value(name),
        FOLDER_MIME_TYPE,
        escape_query_value(parent_id.unwrap_or("root"))
    )
}

/// Drive query for non-trashed Docs under `parent_id` whose name contains `marker`
pub fn documents_query(parent_id: &str, marker: &str) -> String {
    format!(
        "'{}' in parents and name contains '{}' and mimeType = '{}' and trashed = false",
        escape_query_value(parent_id),
        escape_query_value(marker),
        DOCUMENT_MIME_TYPE
    )
}

/// Build a `multipart/related` body: JSON metadata part, then the media part
fn related_body(boundary: &str, metadata: &serde_json::Value, mime_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n--{}\r\nContent-Type: {}\r\n\r\n",
            boundary, metadata, boundary, mime_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl DocumentStore for GoogleWorkspaceClient {
    fn name(&self) -> &str {
        "google-drive"
    }

    async fn find_folders(&self, name: &str, parent_id: Option<&str>) -> Result<Vec<FolderNode>> {
        let files = self.query_files(&folder_query(name, parent_id), None).await?;

        Ok(files
            .into_iter()
            .map(|file| FolderNode {
                name: file.name,
                id: file.id,
                parent_id: file.parents.into_iter().next(),
            })
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderNode> {
        let file = self.create_file(name, FOLDER_MIME_TYPE, parent_id).await?;

        Ok(FolderNode {
            name: name.to_string(),
            id: file.id,
            parent_id: parent_id.map(str::to_string),
        })
    }

    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let boundary = format!("daybook-{}", Uuid::new_v4().simple());
        let metadata = serde_json::json!({ "name": name, "parents": [parent_id] });
        let body = related_body(&boundary, &metadata, mime_type, &bytes);

        let request = self
            .client
            .post(format!("{}/files", self.upload_url))
            .query(&[("uploadType", "multipart"), ("fields", "id,name")])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);

        let file: DriveFile = self.send_json(request, "files.create (upload)").await?;
        Ok(file.id)
    }

    async fn create_document(&self, name: &str, parent_id: &str) -> Result<String> {
        let file = self
            .create_file(name, DOCUMENT_MIME_TYPE, Some(parent_id))
            .await?;
        Ok(file.id)
    }

    async fn append_text(&self, document_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "requests": [{
                "insertText": {
                    "text": text,
                    "endOfSegmentLocation": { "segmentId": "" }
                }
            }]
        });

        let request = self
            .client
            .post(format!("{}/documents/{}:batchUpdate", self.docs_url, document_id))
            .json(&body);
        let _: serde_json::Value = self.send_json(request, "documents.batchUpdate").await?;
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<DocumentContent> {
        let request = self
            .client
            .get(format!("{}/documents/{}", self.docs_url, document_id));
        self.send_json(request, "documents.get").await
    }

    async fn list_documents(&self, parent_id: &str, name_contains: &str) -> Result<Vec<DocumentEntry>> {
        let files = self
            .query_files(&documents_query(parent_id, name_contains), Some("createdTime"))
            .await?;

        Ok(files
            .into_iter()
            .map(|file| DocumentEntry {
                id: file.id,
                name: file.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_query() {
        assert_eq!(
            folder_query("2024", None),
            "name = '2024' and mimeType = 'application/vnd.google-apps.folder' and trashed = false and 'root' in parents"
        );
        assert_eq!(
            folder_query("week_11", Some("abc")),
            "name = 'week_11' and mimeType = 'application/vnd.google-apps.folder' and trashed = false and 'abc' in parents"
        );
    }

    #[test]
    fn test_query_escaping() {
        assert_eq!(escape_query_value("Bob's"), "Bob\\'s");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
        assert_eq!(
            documents_query("f1", "-summary"),
            "'f1' in parents and name contains '-summary' and mimeType = 'application/vnd.google-apps.document' and trashed = false"
        );
    }

    #[test]
    fn test_related_body_layout() {
        let metadata = serde_json::json!({ "name": "a.m4a" });
        let body = related_body("B", &metadata, "audio/mp4", b"AUDIO");
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with("--B\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"a.m4a\"}"));
        assert!(text.contains("Content-Type: audio/mp4\r\n\r\nAUDIO\r\n--B--"));
    }

    #[test]
    fn test_base_url_override() {
        let client = GoogleWorkspaceClient::new("t".to_string())
            .unwrap()
            .with_base_url("http://localhost:8080/");
        assert_eq!(client.drive_url, "http://localhost:8080/drive/v3");
        assert_eq!(client.upload_url, "http://localhost:8080/upload/drive/v3");
        assert_eq!(client.docs_url, "http://localhost:8080/v1");
    }
}
