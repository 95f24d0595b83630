//! Folder view / 文件夹视图
//!
//! A folder is a folder-shaped prefix. Direct children come from one
//! delimiter listing: common prefixes are sub-folders, objects are files.

use async_trait::async_trait;
use bytes::Bytes;

use super::entry::RemoteEntry;
use super::file::FileEntry;
use super::{Copyable, Deletable, Listable};
use crate::error::Result;
use crate::location::{RemoteLocation, SEPARATOR};
use crate::storage::{Listing, StoreBox};

const DELIMITER: &str = "/";

#[derive(Debug, Clone)]
pub struct FolderEntry {
    entry: RemoteEntry,
}

impl FolderEntry {
    pub fn new(store: StoreBox, location: RemoteLocation) -> Self {
        Self::from_entry(RemoteEntry::new(store, location))
    }

    /// Forces the entry's prefix into folder shape
    pub fn from_entry(entry: RemoteEntry) -> Self {
        let location = entry.location().clone().into_folder();
        Self {
            entry: entry.derive(location),
        }
    }

    pub fn location(&self) -> &RemoteLocation {
        self.entry.location()
    }

    pub fn entry(&self) -> &RemoteEntry {
        &self.entry
    }

    pub fn name(&self) -> &str {
        self.location().name()
    }

    pub fn uri(&self) -> String {
        self.location().uri()
    }

    /// One delimiter listing of the direct children
    pub async fn list_children(&self) -> Result<Listing> {
        self.entry.list(Some(DELIMITER)).await
    }

    /// Direct sub-folders
    pub async fn folders(&self) -> Result<Vec<FolderEntry>> {
        let listing = self.list_children().await?;
        Ok(self.folders_of(&listing))
    }

    /// Direct files, without folder placeholder objects
    pub async fn files(&self) -> Result<Vec<FileEntry>> {
        let listing = self.list_children().await?;
        self.files_of(&listing)
    }

    fn folders_of(&self, listing: &Listing) -> Vec<FolderEntry> {
        listing
            .common_prefixes
            .iter()
            .map(|prefix| FolderEntry {
                entry: self.entry.derive(self.location().with_prefix(prefix.as_str())),
            })
            .collect()
    }

    fn files_of(&self, listing: &Listing) -> Result<Vec<FileEntry>> {
        listing
            .objects
            .iter()
            .filter(|o| !o.key.ends_with(SEPARATOR))
            .map(|o| -> Result<FileEntry> {
                let entry = self.entry.derive(self.location().with_prefix(o.key.as_str()));
                Ok(FileEntry::from_entry(entry)?.with_known_size(o.size))
            })
            .collect()
    }

    /// Total size of every file below this folder. Objects without a reported size are skipped.
    pub async fn size(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut pending = vec![self.location().clone()];

        while let Some(location) = pending.pop() {
            let listing = self
                .entry
                .list_prefix(location.prefix(), Some(DELIMITER))
                .await?;
            total += listing
                .objects
                .iter()
                .filter(|o| !o.key.ends_with(SEPARATOR))
                .filter_map(|o| o.size)
                .sum::<u64>();
            pending.extend(
                listing
                    .common_prefixes
                    .iter()
                    .map(|prefix| location.with_prefix(prefix.as_str())),
            );
        }

        tracing::debug!("{} {} Bytes.", self.location(), total);
        Ok(total)
    }

    /// True when a placeholder object or anything below the prefix exists
    pub async fn exists(&self) -> Result<bool> {
        Ok(!self.list_children().await?.is_empty())
    }

    /// Uploads an empty placeholder object for the folder if none exists
    pub async fn create(&self) -> Result<()> {
        if self.location().is_root() {
            return Ok(());
        }
        if !self.entry.object_exists().await? {
            self.entry.put(Bytes::new()).await?;
            tracing::debug!("Folder created: {}", self.location());
        }
        Ok(())
    }

    /// No files or sub-folders; the placeholder object itself does not count
    pub async fn is_empty(&self) -> Result<bool> {
        let listing = self.list_children().await?;
        let prefix = self.location().prefix();
        Ok(listing.common_prefixes.is_empty() && listing.objects.iter().all(|o| o.key == prefix))
    }

    pub async fn file_names(&self) -> Result<Vec<String>> {
        let files = self.files().await?;
        Ok(files.iter().map(|f| f.location().name().to_string()).collect())
    }

    pub async fn folder_names(&self) -> Result<Vec<String>> {
        let folders = self.folders().await?;
        Ok(folders.iter().map(|f| f.name().to_string()).collect())
    }

    pub async fn file_uris(&self) -> Result<Vec<String>> {
        let files = self.files().await?;
        Ok(files.iter().map(|f| f.location().uri()).collect())
    }

    pub async fn folder_uris(&self) -> Result<Vec<String>> {
        let folders = self.folders().await?;
        Ok(folders.iter().map(FolderEntry::uri).collect())
    }

    /// File entry for a direct child; does not check existence
    pub fn get_file(&self, name: &str) -> Result<FileEntry> {
        FileEntry::from_entry(self.entry.derive(self.location().child(name)))
    }

    /// Folder entry for a direct child; does not check existence
    pub fn get_folder(&self, name: &str) -> FolderEntry {
        FolderEntry::from_entry(self.entry.derive(self.location().child(name)))
    }

    /// Direct child files whose name starts with `name_prefix`
    pub async fn filter_files(&self, name_prefix: &str) -> Result<Vec<FileEntry>> {
        let prefix = format!("{}{}", self.location().prefix(), name_prefix);
        let listing = self.entry.list_prefix(&prefix, Some(DELIMITER)).await?;
        self.files_of(&listing)
    }

    /// Deletes everything below the folder but keeps its placeholder object
    pub async fn empty(&self) -> Result<usize> {
        let prefix = self.location().prefix();
        let keys: Vec<String> = self
            .list_keys()
            .await?
            .into_iter()
            .filter(|key| key != prefix)
            .collect();
        self.entry.delete_keys(&keys).await
    }
}

#[async_trait]
impl Listable for FolderEntry {
    async fn list(&self, delimiter: Option<&str>) -> Result<Listing> {
        self.entry.list(delimiter).await
    }
}

#[async_trait]
impl Deletable for FolderEntry {
    async fn delete_all(&self) -> Result<usize> {
        self.entry.delete_all().await
    }
}

#[async_trait]
impl Copyable for FolderEntry {
    async fn copy_to(&self, to: &str) -> Result<usize> {
        self.entry.copy_to(to).await
    }

    async fn move_to(&self, to: &str) -> Result<usize> {
        self.entry.move_to(to).await
    }
}
