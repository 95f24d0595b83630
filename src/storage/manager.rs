use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use serde_json::Value;

use super::ObjectStore;
use crate::config::StreamConfig;
use crate::error::{Result, StorageError};
use crate::location::RemoteLocation;
use crate::retry::RetryPolicy;
use crate::vfs::{FileEntry, FolderEntry, RemoteEntry};

pub type StoreBox = Arc<dyn ObjectStore>;

/// Store factory trait / 存储工厂 trait
pub trait StoreFactory: Send + Sync {
    /// URI scheme served by stores of this factory / 协议名称
    fn scheme(&self) -> &'static str;

    /// Create a store instance from its JSON config / 创建存储实例
    fn create_store(&self, config: Value) -> Result<Box<dyn ObjectStore>>;
}

/// Store manager (one shared client handle per scheme) / 存储管理器
#[derive(Clone)]
pub struct StoreManager {
    stores: Arc<RwLock<HashMap<String, StoreBox>>>,
    factories: Arc<RwLock<HashMap<String, Arc<Box<dyn StoreFactory>>>>>,
    /// Settings handed to every entry resolved through this manager / 条目默认设置
    stream: StreamConfig,
    retry: RetryPolicy,
}

impl Default for StoreManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreManager {
    pub fn new() -> Self {
        Self {
            stores: Arc::new(RwLock::new(HashMap::new())),
            factories: Arc::new(RwLock::new(HashMap::new())),
            stream: StreamConfig::default(),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Register store factory / 注册存储工厂
    pub async fn register_factory(&self, factory: Box<dyn StoreFactory>) {
        let scheme = factory.scheme().to_string();
        let mut factories = self.factories.write().await;
        factories.insert(scheme.clone(), Arc::new(factory));
        tracing::info!("Store factory registered: {}", scheme);
    }

    /// Create the store for `scheme` from config, replacing any previous one / 创建存储实例
    pub async fn create_store(&self, scheme: &str, config: Value) -> Result<StoreBox> {
        let factory = {
            let factories = self.factories.read().await;
            factories
                .get(scheme)
                .cloned()
                .ok_or_else(|| StorageError::UnsupportedScheme(scheme.to_string()))?
        };

        match factory.create_store(config) {
            Ok(store) => {
                let store: StoreBox = Arc::from(store);
                self.insert_store(scheme, store.clone()).await;
                tracing::info!("Store created: {} ({})", scheme, store.name());
                Ok(store)
            }
            Err(e) => {
                tracing::error!("Store creation failed: {} - {}", scheme, e);
                Err(e)
            }
        }
    }

    /// Install an already-built client handle / 注入已创建的存储
    pub async fn insert_store(&self, scheme: &str, store: StoreBox) {
        let mut stores = self.stores.write().await;
        stores.insert(scheme.to_string(), store);
    }

    /// Get store instance / 获取存储实例
    pub async fn get_store(&self, scheme: &str) -> Option<StoreBox> {
        let stores = self.stores.read().await;
        stores.get(scheme).cloned()
    }

    /// Remove store instance / 移除存储实例
    pub async fn remove_store(&self, scheme: &str) -> Result<()> {
        let mut stores = self.stores.write().await;
        stores
            .remove(scheme)
            .ok_or_else(|| StorageError::UnsupportedScheme(scheme.to_string()))?;
        tracing::info!("Store removed: {}", scheme);
        Ok(())
    }

    /// Schemes with a live store / 列出已创建的存储
    pub async fn list_schemes(&self) -> Vec<String> {
        let stores = self.stores.read().await;
        let mut schemes: Vec<String> = stores.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Schemes with a registered factory / 列出所有可用的存储类型
    pub async fn list_factories(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        let mut schemes: Vec<String> = factories.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Resolve a URI to its store and parsed location / 根据URI解析到对应的存储
    pub async fn resolve(&self, uri: &str) -> Result<(StoreBox, RemoteLocation)> {
        let location = RemoteLocation::parse(uri)?;
        let store = self
            .get_store(location.scheme())
            .await
            .ok_or_else(|| StorageError::UnsupportedScheme(location.scheme().to_string()))?;
        Ok((store, location))
    }

    /// Entry over the raw prefix of `uri` (folder, file or filter prefix)
    pub async fn entry(&self, uri: &str) -> Result<RemoteEntry> {
        let (store, location) = self.resolve(uri).await?;
        Ok(RemoteEntry::new(store, location)
            .with_retry(self.retry)
            .with_stream_config(self.stream.clone()))
    }

    pub async fn folder(&self, uri: &str) -> Result<FolderEntry> {
        Ok(FolderEntry::from_entry(self.entry(uri).await?))
    }

    pub async fn file(&self, uri: &str) -> Result<FileEntry> {
        FileEntry::from_entry(self.entry(uri).await?)
    }
}
