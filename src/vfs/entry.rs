//! Shared base of folder and file entries / 远程条目
//!
//! A [`RemoteEntry`] pairs an injected store handle with one location and
//! implements listing, batch delete and copy/move for every key under it.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::Path;

use super::{Copyable, Deletable, Listable};
use crate::config::StreamConfig;
use crate::error::{Result, StorageError};
use crate::location::{RemoteLocation, SEPARATOR};
use crate::retry::{with_retry, RetryPolicy};
use crate::storage::{CopyRequest, Listing, ObjectMeta, ObjectStore, StoreBox};

#[derive(Clone)]
pub struct RemoteEntry {
    store: StoreBox,
    location: RemoteLocation,
    retry: RetryPolicy,
    stream: StreamConfig,
    /// Only the exact key and its `key/` subtree count as members
    anchored: bool,
}

impl fmt::Debug for RemoteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEntry")
            .field("store", &self.store.name())
            .field("location", &self.location)
            .field("anchored", &self.anchored)
            .finish()
    }
}

impl RemoteEntry {
    pub fn new(store: StoreBox, location: RemoteLocation) -> Self {
        Self {
            store,
            location,
            retry: RetryPolicy::none(),
            stream: StreamConfig::default(),
            anchored: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub(crate) fn anchored(mut self) -> Self {
        self.anchored = true;
        self
    }

    pub fn location(&self) -> &RemoteLocation {
        &self.location
    }

    pub fn store(&self) -> &StoreBox {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.stream
    }

    /// Entry on another location sharing this entry's store and settings
    pub fn derive(&self, location: RemoteLocation) -> Self {
        Self {
            store: self.store.clone(),
            location,
            retry: self.retry,
            stream: self.stream.clone(),
            anchored: false,
        }
    }

    fn is_member(&self, key: &str) -> bool {
        if !self.anchored {
            return true;
        }
        let prefix = self.location.prefix();
        key == prefix
            || key
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }

    // Store calls, retried according to the entry's policy.

    pub(crate) async fn list_prefix(&self, prefix: &str, delimiter: Option<&str>) -> Result<Listing> {
        let store: &dyn ObjectStore = self.store.as_ref();
        let bucket = self.location.bucket();
        with_retry(move || store.list(bucket, prefix, delimiter), &self.retry).await
    }

    pub(crate) async fn head(&self) -> Result<Option<ObjectMeta>> {
        let store: &dyn ObjectStore = self.store.as_ref();
        let (bucket, key) = (self.location.bucket(), self.location.prefix());
        with_retry(move || store.head(bucket, key), &self.retry).await
    }

    pub(crate) async fn object_exists(&self) -> Result<bool> {
        let store: &dyn ObjectStore = self.store.as_ref();
        let (bucket, key) = (self.location.bucket(), self.location.prefix());
        with_retry(move || store.exists(bucket, key), &self.retry).await
    }

    pub(crate) async fn get_range(&self, start: u64, end: Option<u64>) -> Result<Option<Bytes>> {
        let store: &dyn ObjectStore = self.store.as_ref();
        let (bucket, key) = (self.location.bucket(), self.location.prefix());
        with_retry(move || store.get_range(bucket, key, start, end), &self.retry).await
    }

    pub(crate) async fn put(&self, data: Bytes) -> Result<()> {
        let store: &dyn ObjectStore = self.store.as_ref();
        let (bucket, key) = (self.location.bucket(), self.location.prefix());
        with_retry(move || store.put(bucket, key, data.clone()), &self.retry).await
    }

    pub(crate) async fn put_file(&self, path: &Path) -> Result<()> {
        let store: &dyn ObjectStore = self.store.as_ref();
        let (bucket, key) = (self.location.bucket(), self.location.prefix());
        with_retry(move || store.put_file(bucket, key, path), &self.retry).await
    }

    pub(crate) async fn delete_keys(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            tracing::debug!("Nothing to delete under {}", self.location);
            return Ok(0);
        }
        let store: &dyn ObjectStore = self.store.as_ref();
        let bucket = self.location.bucket();
        let deleted = with_retry(move || store.delete_batch(bucket, keys), &self.retry).await?;
        tracing::debug!("{} objects deleted under {}", deleted, self.location);
        Ok(deleted)
    }

    /// Destination location and one copy request per source object
    async fn plan_copy(&self, to: &str) -> Result<(RemoteLocation, Vec<CopyRequest>)> {
        let destination = copy_destination(&self.location, to)?;
        if destination.scheme() != self.location.scheme() {
            return Err(StorageError::InvalidArgument(format!(
                "cannot copy {} to another store ({})",
                self.location, destination
            )));
        }

        let requests = self
            .list_keys()
            .await?
            .into_iter()
            .filter_map(|key| {
                let new_key = rewrite_key(&key, self.location.prefix(), destination.prefix())?;
                if destination.bucket() == self.location.bucket() && new_key == key {
                    return None;
                }
                Some(CopyRequest {
                    src_bucket: self.location.bucket().to_string(),
                    src_key: key,
                    dst_bucket: destination.bucket().to_string(),
                    dst_key: new_key,
                })
            })
            .collect();
        Ok((destination, requests))
    }

    async fn run_copy(&self, destination: &RemoteLocation, requests: &[CopyRequest]) -> Result<usize> {
        if requests.is_empty() {
            tracing::debug!("Nothing to copy from {} to {}", self.location, destination);
            return Ok(0);
        }
        let store: &dyn ObjectStore = self.store.as_ref();
        let copied = with_retry(move || store.copy_batch(requests), &self.retry).await?;
        tracing::debug!("{} objects copied from {} to {}", copied, self.location, destination);
        Ok(copied)
    }
}

#[async_trait]
impl Listable for RemoteEntry {
    async fn list(&self, delimiter: Option<&str>) -> Result<Listing> {
        let mut listing = self.list_prefix(self.location.prefix(), delimiter).await?;
        if self.anchored {
            listing.objects.retain(|o| self.is_member(&o.key));
            listing.common_prefixes.retain(|p| self.is_member(p));
        }
        Ok(listing)
    }
}

#[async_trait]
impl Deletable for RemoteEntry {
    async fn delete_all(&self) -> Result<usize> {
        let keys = self.list_keys().await?;
        self.delete_keys(&keys).await
    }
}

#[async_trait]
impl Copyable for RemoteEntry {
    async fn copy_to(&self, to: &str) -> Result<usize> {
        let (destination, requests) = self.plan_copy(to).await?;
        self.run_copy(&destination, &requests).await
    }

    async fn move_to(&self, to: &str) -> Result<usize> {
        let (destination, requests) = self.plan_copy(to).await?;
        let copied = self.run_copy(&destination, &requests).await?;
        // Only sources that were copied are removed; a key mapped onto itself stays.
        let sources: Vec<String> = requests.into_iter().map(|r| r.src_key).collect();
        self.delete_keys(&sources).await?;
        Ok(copied)
    }
}

/// Where the objects under `source` land when copied to `to`.
///
/// A destination with a trailing `/` (or a bucket root) receives the source
/// under its own name. Otherwise the source is renamed: a folder's contents go
/// directly under `to/`, a file or filter prefix is replaced by `to` verbatim.
/// A bucket-root source behaves like a folder named after its bucket.
pub fn copy_destination(source: &RemoteLocation, to: &str) -> Result<RemoteLocation> {
    let target = RemoteLocation::parse(to)?;
    let into = target.is_root() || target.is_folder();
    let source_is_folder = source.is_root() || source.is_folder();

    let prefix = match (source_is_folder, into) {
        (true, true) => format!("{}{}{}", target.prefix(), source.name(), SEPARATOR),
        (true, false) => format!("{}{}", target.prefix(), SEPARATOR),
        (false, true) => format!("{}{}", target.prefix(), source.name()),
        (false, false) => target.prefix().to_string(),
    };
    Ok(target.with_prefix(prefix))
}

/// Replace the leading `from` of `key` with `to`; `None` when `key` is not under `from`
pub fn rewrite_key(key: &str, from: &str, to: &str) -> Option<String> {
    key.strip_prefix(from).map(|rest| format!("{}{}", to, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryStore;
    use std::sync::Arc;

    fn loc(uri: &str) -> RemoteLocation {
        RemoteLocation::parse(uri).unwrap()
    }

    async fn seeded(keys: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for key in keys {
            let (bucket, key) = key.split_once('/').unwrap();
            store.put(bucket, key, Bytes::from(format!("data of {}", key))).await.unwrap();
        }
        store
    }

    fn entry(store: &Arc<MemoryStore>, uri: &str) -> RemoteEntry {
        RemoteEntry::new(store.clone(), loc(uri))
    }

    #[test]
    fn test_copy_destination_rules() {
        let folder = loc("gs://a/a/b/c/");
        let file = loc("gs://a/a/b/report.txt");
        let filter = loc("gs://a/a/b/rep");

        assert_eq!(copy_destination(&folder, "gs://b/x/y/z").unwrap().prefix(), "x/y/z/");
        assert_eq!(copy_destination(&folder, "gs://b/x/").unwrap().prefix(), "x/c/");
        assert_eq!(copy_destination(&file, "gs://b/x/").unwrap().prefix(), "x/report.txt");
        assert_eq!(copy_destination(&file, "gs://b/x/new.txt").unwrap().prefix(), "x/new.txt");
        assert_eq!(copy_destination(&filter, "gs://b/x/").unwrap().prefix(), "x/rep");
        assert_eq!(copy_destination(&filter, "gs://b/old").unwrap().prefix(), "old");
    }

    #[test]
    fn test_copy_destination_bucket_root() {
        // Root is always folder-like, with or without the trailing slash.
        let folder = loc("gs://a/a/b/c/");
        assert_eq!(copy_destination(&folder, "gs://b").unwrap().prefix(), "c/");
        assert_eq!(copy_destination(&folder, "gs://b/").unwrap().prefix(), "c/");

        let file = loc("gs://a/report.txt");
        let dest = copy_destination(&file, "gs://b").unwrap();
        assert_eq!(dest.bucket(), "b");
        assert_eq!(dest.prefix(), "report.txt");

        let root = loc("gs://a");
        assert_eq!(copy_destination(&root, "gs://b/backup/").unwrap().prefix(), "backup/a/");
    }

    #[test]
    fn test_rewrite_key() {
        assert_eq!(rewrite_key("a/b/c/d/e.txt", "a/b/c/", "x/y/z/").as_deref(), Some("x/y/z/d/e.txt"));
        assert_eq!(rewrite_key("a/b", "", "p/").as_deref(), Some("p/a/b"));
        assert_eq!(rewrite_key("other/b/c/", "a/b/c/", "x/"), None);
    }

    #[tokio::test]
    async fn test_folder_rename_across_buckets() {
        let store = seeded(&["bucket_a/a/b/c/d/example.txt", "bucket_a/a/b/c/example.txt", "bucket_a/a/b/other.txt"]).await;
        let copied = entry(&store, "gs://bucket_a/a/b/c/").copy_to("gs://bucket_b/x/y/z").await.unwrap();
        assert_eq!(copied, 2);

        let dest = entry(&store, "gs://bucket_b/");
        assert_eq!(dest.list_keys().await.unwrap(), vec!["x/y/z/d/example.txt", "x/y/z/example.txt"]);
        assert_eq!(
            store.get_range("bucket_b", "x/y/z/d/example.txt", 0, None).await.unwrap().unwrap(),
            Bytes::from("data of a/b/c/d/example.txt")
        );
    }

    #[tokio::test]
    async fn test_folder_copy_into_keeps_name() {
        let store = seeded(&["t/test_folder/file_in_folder.txt", "t/test_folder/sub/deep.txt"]).await;
        let copied = entry(&store, "mem://t/test_folder/").copy_to("mem://t/copy_test/").await.unwrap();
        assert_eq!(copied, 2);
        assert_eq!(
            entry(&store, "mem://t/copy_test/").list_keys().await.unwrap(),
            vec!["copy_test/test_folder/file_in_folder.txt", "copy_test/test_folder/sub/deep.txt"]
        );
        // Source untouched
        assert_eq!(entry(&store, "mem://t/test_folder/").list_keys().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_copy_zero_matches_is_noop() {
        let store = seeded(&["t/a.txt"]).await;
        let copied = entry(&store, "mem://t/missing/").copy_to("mem://t/dest/").await.unwrap();
        assert_eq!(copied, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_copy_onto_itself_is_skipped() {
        let store = seeded(&["t/a.txt"]).await;
        let moved = entry(&store, "mem://t/a.txt").move_to("mem://t/a.txt").await.unwrap();
        assert_eq!(moved, 0);
        assert!(store.exists("t", "a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_to_other_scheme_rejected() {
        let store = seeded(&["t/a.txt"]).await;
        let result = entry(&store, "mem://t/a.txt").copy_to("s3://t/b.txt").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_move_removes_source() {
        let store = seeded(&["t/src/one.txt", "t/src/two.txt", "t/keep.txt"]).await;
        let moved = entry(&store, "mem://t/src/").move_to("mem://t/dst").await.unwrap();
        assert_eq!(moved, 2);
        assert!(entry(&store, "mem://t/src/").list_keys().await.unwrap().is_empty());
        assert_eq!(
            entry(&store, "mem://t/").list_keys().await.unwrap(),
            vec!["dst/one.txt", "dst/two.txt", "keep.txt"]
        );
    }

    #[tokio::test]
    async fn test_delete_all_then_listing_is_empty() {
        let store = seeded(&["t/dir/a.txt", "t/dir/sub/b.txt", "t/dirt.txt"]).await;
        let dir = entry(&store, "mem://t/dir/");
        assert_eq!(dir.delete_all().await.unwrap(), 2);

        let listing = dir.list(Some("/")).await.unwrap();
        assert!(listing.is_empty());
        assert_eq!(dir.delete_all().await.unwrap(), 0);
        assert!(store.exists("t", "dirt.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_filter_prefix_is_unanchored() {
        let store = seeded(&["t/log-1.txt", "t/log-2.txt", "t/logs/x.txt", "t/other.txt"]).await;
        let keys = entry(&store, "mem://t/log").list_keys().await.unwrap();
        assert_eq!(keys, vec!["log-1.txt", "log-2.txt", "logs/x.txt"]);

        let anchored = entry(&store, "mem://t/log-1.txt").anchored();
        assert_eq!(anchored.list_keys().await.unwrap(), vec!["log-1.txt"]);
    }
}
