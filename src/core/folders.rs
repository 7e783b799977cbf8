//! Year and week folder resolution in the document store.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::domain::{FolderNode, TimeContext, WeekFolders};
use crate::providers::DocumentStore;

/// Finds, and for the daily job creates, the `YYYY/week_NN` folder pair.
///
/// Not transactional: two processes resolving the same path at once can both
/// create it. Runs hold the per-job lock, so only another host can race.
pub struct FolderResolver<'a> {
    documents: &'a dyn DocumentStore,
    /// Parent of the year folders; the store's top level when `None`
    root_id: Option<&'a str>,
}

impl<'a> FolderResolver<'a> {
    pub fn new(documents: &'a dyn DocumentStore) -> Self {
        Self {
            documents,
            root_id: None,
        }
    }

    /// File year folders under `root_id` instead of the top level
    pub fn with_root(mut self, root_id: Option<&'a str>) -> Self {
        self.root_id = root_id;
        self
    }

    /// Look up a folder without creating it
    pub async fn find(&self, name: &str, parent_id: Option<&str>) -> Result<Option<FolderNode>> {
        let mut matches = self.documents.find_folders(name, parent_id).await?;

        if matches.len() > 1 {
            warn!(
                folder = name,
                parent = parent_id.unwrap_or("root"),
                count = matches.len(),
                "Multiple folders match, using the first"
            );
        }

        if matches.is_empty() {
            Ok(None)
        } else {
            Ok(Some(matches.swap_remove(0)))
        }
    }

    /// Return the existing folder with this name and parent, or create it
    pub async fn resolve_or_create(&self, name: &str, parent_id: Option<&str>) -> Result<FolderNode> {
        if let Some(folder) = self.find(name, parent_id).await? {
            debug!(folder = name, id = %folder.id, "Folder exists");
            return Ok(folder);
        }

        let folder = self.documents.create_folder(name, parent_id).await?;
        info!(folder = name, id = %folder.id, "Created folder");
        Ok(folder)
    }

    /// Year folder under the root, then the week folder under it
    pub async fn resolve_week(&self, time: &TimeContext) -> Result<WeekFolders> {
        let year = self
            .resolve_or_create(&time.year_folder_name(), self.root_id)
            .await?;
        let week = self
            .resolve_or_create(&time.week_folder_name(), Some(&year.id))
            .await?;

        Ok(WeekFolders { year, week })
    }

    /// Lookup-only variant; `None` when either level is missing
    pub async fn find_week(&self, time: &TimeContext) -> Result<Option<WeekFolders>> {
        let Some(year) = self.find(&time.year_folder_name(), self.root_id).await? else {
            return Ok(None);
        };
        let Some(week) = self.find(&time.week_folder_name(), Some(&year.id)).await? else {
            return Ok(None);
        };

        Ok(Some(WeekFolders { year, week }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::MemoryDocumentStore;
    use chrono::NaiveDate;

    fn march_14() -> TimeContext {
        TimeContext::from_date(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap())
    }

    #[tokio::test]
    async fn test_resolve_or_create_is_idempotent() {
        let store = MemoryDocumentStore::new();
        let resolver = FolderResolver::new(&store);

        let first = resolver.resolve_or_create("2024", None).await.unwrap();
        let second = resolver.resolve_or_create("2024", None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.call_count("create_folder"), 1);
    }

    #[tokio::test]
    async fn test_parent_scopes_lookup() {
        let store = MemoryDocumentStore::new();
        let y2023 = store.insert_folder("2023", None);
        store.insert_folder("week_11", Some(&y2023.id));
        let y2024 = store.insert_folder("2024", None);

        let resolver = FolderResolver::new(&store);
        let week = resolver
            .resolve_or_create("week_11", Some(&y2024.id))
            .await
            .unwrap();

        assert_eq!(week.parent_id.as_deref(), Some(y2024.id.as_str()));
        assert_eq!(store.call_count("create_folder"), 1);
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let store = MemoryDocumentStore::new();
        let first = store.insert_folder("2024", None);
        store.insert_folder("2024", None);

        let resolver = FolderResolver::new(&store);
        let found = resolver.resolve_or_create("2024", None).await.unwrap();

        assert_eq!(found.id, first.id);
        assert_eq!(store.call_count("create_folder"), 0);
    }

    #[tokio::test]
    async fn test_resolve_week_creates_both_levels() {
        let store = MemoryDocumentStore::new();
        let folders = FolderResolver::new(&store)
            .resolve_week(&march_14())
            .await
            .unwrap();

        assert_eq!(folders.year.name, "2024");
        assert_eq!(folders.week.name, "week_11");
        assert_eq!(folders.week.parent_id.as_deref(), Some(folders.year.id.as_str()));
    }

    #[tokio::test]
    async fn test_nested_year_folder_is_not_the_year_root() {
        let store = MemoryDocumentStore::new();
        let photos = store.insert_folder("Photos", None);
        let decoy = store.insert_folder("2024", Some(&photos.id));

        let resolver = FolderResolver::new(&store);
        assert!(resolver.find_week(&march_14()).await.unwrap().is_none());

        let folders = resolver.resolve_week(&march_14()).await.unwrap();
        assert_ne!(folders.year.id, decoy.id);
        assert_eq!(folders.year.parent_id, None);
        assert_eq!(store.call_count("create_folder"), 2);
    }

    #[tokio::test]
    async fn test_configured_root_scopes_year_folder() {
        let store = MemoryDocumentStore::new();
        let journals = store.insert_folder("journals", None);
        store.insert_folder("2024", None);

        let folders = FolderResolver::new(&store)
            .with_root(Some(&journals.id))
            .resolve_week(&march_14())
            .await
            .unwrap();

        assert_eq!(folders.year.parent_id.as_deref(), Some(journals.id.as_str()));
        assert_eq!(store.call_count("create_folder"), 2);
    }

    #[tokio::test]
    async fn test_find_week_never_creates() {
        let store = MemoryDocumentStore::new();
        store.insert_folder("2024", None);

        let found = FolderResolver::new(&store)
            .find_week(&march_14())
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(store.call_count("create_folder"), 0);
    }
}
