use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Metadata of one remote object / 对象元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    /// Size in bytes; `None` when the store does not report it
    pub size: Option<u64>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

impl ObjectMeta {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size: Some(size),
            last_modified: None,
            etag: None,
        }
    }
}

/// Result of one listing call / 单次列举结果
///
/// With a delimiter, `objects` holds direct children only and every deeper key
/// is folded into `common_prefixes`. The two sets never share a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub objects: Vec<ObjectMeta>,
    pub common_prefixes: Vec<String>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.common_prefixes.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.key.clone()).collect()
    }

    /// Builds a listing out of every object under `prefix`, folding keys that
    /// continue past `delimiter` into common prefixes.
    /// Stores without native delimiter support list recursively and fold here.
    pub fn fold(all: Vec<ObjectMeta>, prefix: &str, delimiter: Option<&str>) -> Self {
        let mut listing = Listing::default();
        let delimiter = match delimiter {
            Some(d) if !d.is_empty() => d,
            _ => {
                listing.objects = all
                    .into_iter()
                    .filter(|o| o.key.starts_with(prefix))
                    .collect();
                listing.objects.sort_by(|a, b| a.key.cmp(&b.key));
                return listing;
            }
        };

        for obj in all {
            let Some(rest) = obj.key.strip_prefix(prefix) else {
                continue;
            };
            match rest.find(delimiter) {
                // A key equal to `prefix + something + delimiter` is a placeholder
                // of a sub-folder and belongs to that common prefix as well.
                Some(pos) => {
                    let common = format!("{}{}", prefix, &rest[..pos + delimiter.len()]);
                    if !listing.common_prefixes.contains(&common) {
                        listing.common_prefixes.push(common);
                    }
                }
                None => listing.objects.push(obj),
            }
        }
        listing.objects.sort_by(|a, b| a.key.cmp(&b.key));
        listing.common_prefixes.sort();
        listing
    }
}

/// One server-side copy inside a batch / 批量复制中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub src_bucket: String,
    pub src_key: String,
    pub dst_bucket: String,
    pub dst_key: String,
}

/// Remote store capability (provides only primitive operations) / 对象存储接口
///
/// Keys are flat strings; any hierarchy is emulated by callers through prefixes
/// and delimiter listings. Implementations never retry on their own.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store name used in logs and errors / 存储名称
    fn name(&self) -> &str;

    /// List objects under `prefix` / 列出前缀下的对象
    async fn list(&self, bucket: &str, prefix: &str, delimiter: Option<&str>) -> Result<Listing>;

    /// Object metadata, `None` if the object does not exist / 获取对象元数据
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>>;

    /// Existence check / 判断对象是否存在
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.head(bucket, key).await?.is_some())
    }

    /// Ranged read, `end` inclusive; `None` if the object does not exist / 范围读取
    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<Option<Bytes>>;

    /// Whole-object write (overwrites) / 整体写入
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;

    /// Whole-object write from a local file / 从本地文件上传
    /// Default implementation reads the file into memory then calls `put`
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        self.put(bucket, key, Bytes::from(data)).await
    }

    /// Delete a batch of keys in one request; returns how many were deleted / 批量删除
    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize>;

    /// Copy a batch of objects in one request; returns how many were copied / 批量复制
    async fn copy_batch(&self, requests: &[CopyRequest]) -> Result<usize>;
}

pub mod manager;

pub use manager::{StoreManager, StoreFactory, StoreBox};

#[cfg(test)]
mod tests {
    use super::*;

    fn metas(keys: &[&str]) -> Vec<ObjectMeta> {
        keys.iter().map(|k| ObjectMeta::new(*k, 1)).collect()
    }

    #[test]
    fn test_fold_with_delimiter() {
        let all = metas(&[
            "file_in_root.txt",
            "test_folder/file_in_folder.txt",
            "test_folder/sub/deep.txt",
            "other/",
        ]);
        let listing = Listing::fold(all, "", Some("/"));
        assert_eq!(listing.keys(), vec!["file_in_root.txt"]);
        assert_eq!(listing.common_prefixes, vec!["other/", "test_folder/"]);
    }

    #[test]
    fn test_fold_keeps_prefix_placeholder_as_object() {
        let all = metas(&["a/", "a/x.txt", "a/b/y.txt", "ab.txt"]);
        let listing = Listing::fold(all, "a/", Some("/"));
        assert_eq!(listing.keys(), vec!["a/", "a/x.txt"]);
        assert_eq!(listing.common_prefixes, vec!["a/b/"]);
    }

    #[test]
    fn test_fold_recursive() {
        let all = metas(&["a/b/c.txt", "a/x.txt", "z.txt"]);
        let listing = Listing::fold(all, "a/", None);
        assert_eq!(listing.keys(), vec!["a/b/c.txt", "a/x.txt"]);
        assert!(listing.common_prefixes.is_empty());
    }
}
