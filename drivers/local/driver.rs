use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Result, StorageError};
use crate::storage::{CopyRequest, Listing, ObjectMeta, ObjectStore};

/// Directory-backed store: `<root>/<bucket>/<key>`
///
/// Empty directories surface as `key/` placeholder objects of size 0.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get root directory / 获取根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\']) {
            return Err(StorageError::InvalidArgument(format!("Invalid bucket name: {}", bucket)));
        }
        Ok(self.root.join(bucket))
    }

    /// Map a key to a path, rejecting anything that escapes the bucket / 规范化路径
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.bucket_path(bucket)?;
        for component in key.split('/').filter(|s| !s.is_empty()) {
            if component == ".." || component == "." || component.contains('\\') {
                return Err(StorageError::InvalidArgument(format!(
                    "Access path exceeds bucket scope: {}",
                    key
                )));
            }
            path.push(component);
        }
        Ok(path)
    }

    /// Every object in the bucket, keys relative to the bucket directory
    async fn walk(&self, bucket: &str) -> Result<Vec<ObjectMeta>> {
        let bucket_dir = self.bucket_path(bucket)?;
        let mut objects = Vec::new();
        if !tokio::fs::try_exists(&bucket_dir).await? {
            return Ok(objects);
        }

        let mut pending = vec![(bucket_dir, String::new())];
        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            let mut empty = true;
            while let Some(entry) = entries.next_entry().await? {
                empty = false;
                let metadata = entry.metadata().await?;
                let name = entry.file_name().to_string_lossy().to_string();
                let key = format!("{}{}", key_prefix, name);
                if metadata.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else {
                    objects.push(meta_of(key, &metadata));
                }
            }
            if empty && !key_prefix.is_empty() {
                objects.push(ObjectMeta {
                    key: key_prefix,
                    size: Some(0),
                    last_modified: None,
                    etag: None,
                });
            }
        }
        Ok(objects)
    }

    /// Remove empty directories from `path` up to (not including) the bucket directory
    async fn prune_empty_parents(&self, bucket: &str, path: &Path) {
        let Ok(bucket_dir) = self.bucket_path(bucket) else {
            return;
        };
        let mut current = path.parent().map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == bucket_dir || !dir.starts_with(&bucket_dir) {
                break;
            }
            // remove_dir fails on non-empty directories, which ends the walk
            if tokio::fs::remove_dir(&dir).await.is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }

    async fn delete_one(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self.object_path(bucket, key)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            if !key.ends_with('/') {
                return Ok(false);
            }
            tokio::fs::remove_dir(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        self.prune_empty_parents(bucket, &path).await;
        Ok(true)
    }

    async fn copy_one(&self, req: &CopyRequest) -> Result<()> {
        let src = self.object_path(&req.src_bucket, &req.src_key)?;
        let dst = self.object_path(&req.dst_bucket, &req.dst_key)?;
        if req.src_key.ends_with('/') {
            tokio::fs::create_dir_all(&dst).await?;
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, &dst).await?;
        Ok(())
    }
}

fn meta_of(key: String, metadata: &std::fs::Metadata) -> ObjectMeta {
    let modified = metadata
        .modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
    ObjectMeta {
        key,
        size: Some(metadata.len()),
        last_modified: modified,
        etag: None,
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(&self, bucket: &str, prefix: &str, delimiter: Option<&str>) -> Result<Listing> {
        let all = self.walk(bucket).await?;
        Ok(Listing::fold(all, prefix, delimiter))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let path = self.object_path(bucket, key)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match (metadata.is_dir(), key.ends_with('/')) {
            (true, true) => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: Some(0),
                last_modified: None,
                etag: None,
            })),
            (false, false) => Ok(Some(meta_of(key.to_string(), &metadata))),
            _ => Ok(None),
        }
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<Option<Bytes>> {
        let Some(meta) = self.head(bucket, key).await? else {
            return Ok(None);
        };
        if key.ends_with('/') {
            return Ok(Some(Bytes::new()));
        }
        let len = meta.size.unwrap_or(0);
        let start = start.min(len);
        let end = end.map(|e| e.saturating_add(1).min(len)).unwrap_or(len).max(start);

        let path = self.object_path(bucket, key)?;
        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut buf = Vec::with_capacity((end - start) as usize);
        file.take(end - start).read_to_end(&mut buf).await?;
        Ok(Some(Bytes::from(buf)))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if key.ends_with('/') {
            tokio::fs::create_dir_all(&path).await?;
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn put_file(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, &path).await?;
        Ok(())
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize> {
        let mut deleted = 0;
        let mut failures = Vec::new();
        for key in keys {
            match self.delete_one(bucket, key).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => failures.push(format!("{}: {}", key, e)),
            }
        }
        match failures.first() {
            None => Ok(deleted),
            Some(first) => Err(StorageError::Batch {
                op: "delete",
                failed: failures.len(),
                total: keys.len(),
                first: first.clone(),
            }),
        }
    }

    async fn copy_batch(&self, requests: &[CopyRequest]) -> Result<usize> {
        let mut copied = 0;
        let mut failures = Vec::new();
        for req in requests {
            match self.copy_one(req).await {
                Ok(()) => copied += 1,
                Err(e) => failures.push(format!("{}/{}: {}", req.src_bucket, req.src_key, e)),
            }
        }
        match failures.first() {
            None => Ok(copied),
            Some(first) => Err(StorageError::Batch {
                op: "copy",
                failed: failures.len(),
                total: requests.len(),
                first: first.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_list_get() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        store.put("t", "file_in_root.txt", Bytes::from_static(b"root")).await.unwrap();
        store.put("t", "test_folder/file_in_folder.txt", Bytes::from_static(b"x")).await.unwrap();
        store.put("t", "empty/", Bytes::new()).await.unwrap();

        let listing = store.list("t", "", Some("/")).await.unwrap();
        assert_eq!(listing.keys(), vec!["file_in_root.txt"]);
        assert_eq!(listing.common_prefixes, vec!["empty/", "test_folder/"]);

        let all = store.list("t", "", None).await.unwrap();
        assert_eq!(all.keys(), vec!["empty/", "file_in_root.txt", "test_folder/file_in_folder.txt"]);

        let data = store.get_range("t", "file_in_root.txt", 1, Some(2)).await.unwrap().unwrap();
        assert_eq!(&data[..], b"oo");
        assert!(store.get_range("t", "abc.txt", 0, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        assert!(matches!(
            store.put("t", "../escape.txt", Bytes::new()).await,
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(store.head("..", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_dirs() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        store.put("t", "a/b/c.txt", Bytes::from_static(b"c")).await.unwrap();
        store.put("t", "keep.txt", Bytes::from_static(b"k")).await.unwrap();

        let deleted = store.delete_batch("t", &["a/b/c.txt".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        let listing = store.list("t", "", Some("/")).await.unwrap();
        assert_eq!(listing.keys(), vec!["keep.txt"]);
        assert!(listing.common_prefixes.is_empty());
        assert!(dir.path().join("t").exists());
    }

    #[tokio::test]
    async fn test_copy_across_buckets() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        store.put("a", "x/y.txt", Bytes::from_static(b"hello")).await.unwrap();
        let copied = store
            .copy_batch(&[CopyRequest {
                src_bucket: "a".into(),
                src_key: "x/y.txt".into(),
                dst_bucket: "b".into(),
                dst_key: "z/y.txt".into(),
            }])
            .await
            .unwrap();
        assert_eq!(copied, 1);
        let data = store.get_range("b", "z/y.txt", 0, None).await.unwrap().unwrap();
        assert_eq!(&data[..], b"hello");
    }
}
