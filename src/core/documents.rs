//! Writing journal documents.

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::{DocumentKind, StoredDocument};
use crate::providers::DocumentStore;

/// Create a document in a folder and fill it with `text`.
///
/// Not atomic: if the append fails the empty document stays behind.
pub async fn write_document(
    documents: &dyn DocumentStore,
    parent_id: &str,
    title: &str,
    text: &str,
    kind: DocumentKind,
) -> Result<StoredDocument> {
    let id = documents
        .create_document(title, parent_id)
        .await
        .with_context(|| format!("Failed to create document {}", title))?;

    documents
        .append_text(&id, text)
        .await
        .with_context(|| format!("Failed to write document {} ({})", title, id))?;

    info!(document = title, %id, chars = text.len(), "Stored document");

    Ok(StoredDocument {
        id,
        title: title.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::MemoryDocumentStore;

    #[tokio::test]
    async fn test_write_document_fills_body() {
        let store = MemoryDocumentStore::new();
        let week = store.insert_folder("week_11", None);

        let doc = write_document(
            &store,
            &week.id,
            "03-14-2024-transcript",
            "hello there",
            DocumentKind::Transcript,
        )
        .await
        .unwrap();

        let file = store.file_named("03-14-2024-transcript").unwrap();
        assert_eq!(file.id, doc.id);
        assert_eq!(file.text, "hello there");
        assert_eq!(file.parent_id.as_deref(), Some(week.id.as_str()));
        assert_eq!(store.calls(), vec!["create_document", "append_text"]);
    }

    #[tokio::test]
    async fn test_create_failure_names_document() {
        let store = MemoryDocumentStore::new();
        store.fail_create_document("03-14-2024-summary");

        let err = write_document(&store, "mem-1", "03-14-2024-summary", "x", DocumentKind::Summary)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("03-14-2024-summary"));
    }
}
