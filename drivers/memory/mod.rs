//! In-memory store.
//!
//! Objects live in a `BTreeMap` keyed by `(bucket, key)`, which gives
//! deterministic listing order. Buckets exist implicitly.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Result, StorageError};
use crate::storage::{CopyRequest, Listing, ObjectMeta, ObjectStore, StoreFactory};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    meta: ObjectMeta,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<(String, String), StoredObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects across all buckets
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn stored(key: &str, data: Bytes) -> StoredObject {
        let meta = ObjectMeta {
            key: key.to_string(),
            size: Some(data.len() as u64),
            last_modified: Some(Utc::now().to_rfc3339()),
            etag: Some(format!("{:x}", md5::compute(&data))),
        };
        StoredObject { data, meta }
    }
}

fn validate(bucket: &str, key: &str) -> Result<()> {
    if bucket.is_empty() {
        return Err(StorageError::InvalidArgument("bucket must be non-empty".into()));
    }
    if key.is_empty() {
        return Err(StorageError::InvalidArgument("key must be non-empty".into()));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, bucket: &str, prefix: &str, delimiter: Option<&str>) -> Result<Listing> {
        let objs = self.objects.read().await;
        let all: Vec<ObjectMeta> = objs
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|(_, obj)| obj.meta.clone())
            .collect();
        Ok(Listing::fold(all, prefix, delimiter))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let objs = self.objects.read().await;
        Ok(objs
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| obj.meta.clone()))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<Option<Bytes>> {
        let objs = self.objects.read().await;
        let Some(obj) = objs.get(&(bucket.to_string(), key.to_string())) else {
            return Ok(None);
        };
        let len = obj.data.len() as u64;
        let start = start.min(len);
        let end = end.map(|e| e.saturating_add(1).min(len)).unwrap_or(len).max(start);
        Ok(Some(obj.data.slice(start as usize..end as usize)))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        validate(bucket, key)?;
        let mut objs = self.objects.write().await;
        objs.insert((bucket.to_string(), key.to_string()), Self::stored(key, data));
        Ok(())
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize> {
        let mut objs = self.objects.write().await;
        let deleted = keys
            .iter()
            .filter(|k| objs.remove(&(bucket.to_string(), k.to_string())).is_some())
            .count();
        Ok(deleted)
    }

    async fn copy_batch(&self, requests: &[CopyRequest]) -> Result<usize> {
        let mut objs = self.objects.write().await;
        let mut copied = 0;
        let mut failures = Vec::new();
        for req in requests {
            let source = objs
                .get(&(req.src_bucket.clone(), req.src_key.clone()))
                .map(|obj| obj.data.clone());
            match source {
                Some(data) => {
                    objs.insert(
                        (req.dst_bucket.clone(), req.dst_key.clone()),
                        Self::stored(&req.dst_key, data),
                    );
                    copied += 1;
                }
                None => failures.push(format!("{}/{}: not found", req.src_bucket, req.src_key)),
            }
        }
        if let Some(first) = failures.first() {
            return Err(StorageError::Batch {
                op: "copy",
                failed: failures.len(),
                total: requests.len(),
                first: first.clone(),
            });
        }
        Ok(copied)
    }
}

/// Memory store factory (config is ignored)
pub struct MemoryStoreFactory;

impl StoreFactory for MemoryStoreFactory {
    fn scheme(&self) -> &'static str {
        "mem"
    }

    fn create_store(&self, _config: Value) -> Result<Box<dyn ObjectStore>> {
        Ok(Box::new(MemoryStore::new()))
    }
}
