//! S3驱动核心实现
//!
//! 设计原则：
//! - 只提供原语（list, head, ranged get, put, batch delete/copy）
//! - 每个bucket懒加载一个客户端并缓存
//! - 同bucket复制使用服务端CopyObject，跨bucket复制先下载再上传

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::Region;

use crate::error::{Result, StorageError};
use crate::storage::{CopyRequest, Listing, ObjectMeta, ObjectStore};
use super::config::S3Config;

const STORE_NAME: &str = "S3";

/// S3 store. The handle is shared; per-bucket clients are created on first use.
pub struct S3Store {
    config: S3Config,
    buckets: RwLock<HashMap<String, Box<Bucket>>>,
}

impl S3Store {
    /// 创建新的S3存储实例（校验凭证格式，不发起请求）
    pub fn new(config: S3Config) -> Result<Self> {
        Self::credentials(&config)?;
        Ok(Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    fn credentials(config: &S3Config) -> Result<Credentials> {
        Credentials::new(
            Some(&config.access_key_id),
            Some(&config.secret_access_key),
            if config.session_token.is_empty() { None } else { Some(&config.session_token) },
            None,
            None,
        )
        .map_err(|e| StorageError::backend(STORE_NAME, format!("创建S3凭证失败: {}", e)))
    }

    /// 获取（或创建）指定bucket的客户端
    fn bucket(&self, name: &str) -> Result<Box<Bucket>> {
        if let Some(bucket) = self.buckets.read().get(name) {
            return Ok(bucket.clone());
        }

        let region = Region::Custom {
            region: self.config.region.clone(),
            endpoint: self.config.resolved_endpoint(),
        };
        let bucket = Bucket::new(name, region, Self::credentials(&self.config)?)
            .map_err(|e| StorageError::backend(STORE_NAME, format!("创建S3 Bucket失败: {}", e)))?;
        let bucket = if self.config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        self.buckets.write().insert(name.to_string(), bucket.clone());
        tracing::debug!("S3 bucket client created: {}", name);
        Ok(bucket)
    }

    /// S3 CopyObject（同bucket，源key需要URL编码）
    async fn server_side_copy(&self, bucket: &Bucket, src_key: &str, dst_key: &str) -> Result<()> {
        let encoded_src = urlencoding::encode(src_key);
        tracing::debug!("S3 CopyObject: src_key={}, encoded={}, dst_key={}", src_key, encoded_src, dst_key);

        let code = bucket
            .copy_object_internal(&encoded_src, dst_key)
            .await
            .map_err(|e| StorageError::backend(STORE_NAME, format!("S3 CopyObject失败: {}", e)))?;
        check_status(code, &format!("copy {} -> {}", src_key, dst_key))
    }

    /// 跨bucket复制：下载后上传
    async fn download_upload_copy(&self, req: &CopyRequest) -> Result<()> {
        let src = self.bucket(&req.src_bucket)?;
        let dst = self.bucket(&req.dst_bucket)?;
        let response = src
            .get_object(&req.src_key)
            .await
            .map_err(|e| StorageError::backend(STORE_NAME, format!("获取S3对象失败: {}", e)))?;
        check_status(response.status_code(), &format!("get {}", req.src_key))?;

        let response = dst
            .put_object(&req.dst_key, response.bytes())
            .await
            .map_err(|e| StorageError::backend(STORE_NAME, format!("上传S3对象失败: {}", e)))?;
        check_status(response.status_code(), &format!("put {}", req.dst_key))
    }

    async fn copy_one(&self, req: &CopyRequest) -> Result<()> {
        if req.src_bucket == req.dst_bucket {
            let bucket = self.bucket(&req.src_bucket)?;
            self.server_side_copy(&bucket, &req.src_key, &req.dst_key).await
        } else {
            self.download_upload_copy(req).await
        }
    }
}

fn check_status(code: u16, what: &str) -> Result<()> {
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(StorageError::backend(STORE_NAME, format!("{} returned HTTP {}", what, code)))
    }
}

/// Collapse per-item failures of a batch into one error
fn batch_result(op: &'static str, done: usize, total: usize, failures: Vec<String>) -> Result<usize> {
    match failures.first() {
        None => Ok(done),
        Some(first) => {
            tracing::warn!("S3 batch {}: {}/{} failed", op, failures.len(), total);
            Err(StorageError::Batch {
                op,
                failed: failures.len(),
                total,
                first: first.clone(),
            })
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        STORE_NAME
    }

    async fn list(&self, bucket: &str, prefix: &str, delimiter: Option<&str>) -> Result<Listing> {
        let client = self.bucket(bucket)?;
        let results = client
            .list(prefix.to_string(), delimiter.map(str::to_string))
            .await
            .map_err(|e| StorageError::backend(STORE_NAME, format!("列出S3对象失败: {}", e)))?;

        let mut listing = Listing::default();
        for result in results {
            // 处理目录（公共前缀）
            for cp in result.common_prefixes.unwrap_or_default() {
                if !listing.common_prefixes.contains(&cp.prefix) {
                    listing.common_prefixes.push(cp.prefix);
                }
            }
            // 处理文件
            for obj in result.contents {
                listing.objects.push(ObjectMeta {
                    key: obj.key,
                    size: Some(obj.size),
                    last_modified: Some(obj.last_modified),
                    etag: obj.e_tag,
                });
            }
        }
        listing.objects.sort_by(|a, b| a.key.cmp(&b.key));
        listing.common_prefixes.sort();
        Ok(listing)
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let client = self.bucket(bucket)?;
        let (resp, code) = client
            .head_object(key)
            .await
            .map_err(|e| StorageError::backend(STORE_NAME, format!("获取S3对象信息失败: {}", e)))?;
        if code == 404 {
            return Ok(None);
        }
        check_status(code, &format!("head {}", key))?;
        Ok(Some(ObjectMeta {
            key: key.to_string(),
            size: resp.content_length.and_then(|len| u64::try_from(len).ok()),
            last_modified: resp.last_modified,
            etag: resp.e_tag,
        }))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<Option<Bytes>> {
        let client = self.bucket(bucket)?;
        let response = client
            .get_object_range(key, start, end)
            .await
            .map_err(|e| StorageError::backend(STORE_NAME, format!("获取S3对象失败: {}", e)))?;
        match response.status_code() {
            404 => Ok(None),
            // Range starts past the end of the object
            416 => Ok(Some(Bytes::new())),
            code => {
                check_status(code, &format!("get {}", key))?;
                Ok(Some(response.bytes().clone()))
            }
        }
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let client = self.bucket(bucket)?;
        let response = client
            .put_object(key, &data)
            .await
            .map_err(|e| StorageError::backend(STORE_NAME, format!("上传S3对象失败: {}", e)))?;
        check_status(response.status_code(), &format!("put {}", key))
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let client = self.bucket(bucket)?;
        let mut file = tokio::fs::File::open(path).await?;
        client
            .put_object_stream(&mut file, key)
            .await
            .map_err(|e| StorageError::backend(STORE_NAME, format!("流式上传S3对象失败: {}", e)))?;
        tracing::debug!("S3 stream upload done: {:?} -> {}/{}", path, bucket, key);
        Ok(())
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize> {
        let client = self.bucket(bucket)?;
        let mut deleted = 0;
        let mut failures = Vec::new();
        for key in keys {
            match client.delete_object(key).await {
                Ok(resp) if (200..300).contains(&resp.status_code()) => deleted += 1,
                Ok(resp) => failures.push(format!("{}: HTTP {}", key, resp.status_code())),
                Err(e) => failures.push(format!("{}: {}", key, e)),
            }
        }
        batch_result("delete", deleted, keys.len(), failures)
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
        batch_result("copy", copied, requests.len(), failures)
    }
}
