//! Application configuration module / 应用配置模块
//!
//! Configuration is loaded from a JSON file. A default file is written on
//! first use / 首次运行时创建默认配置文件

use anyhow::Context;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::drivers::local::LocalConfig;
use crate::drivers::s3::S3Config;
use crate::retry::RetryPolicy;
use crate::storage::StoreManager;

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Default config file name / 默认配置文件名
pub const CONFIG_FILE: &str = "bucketfs.json";

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store configuration / 存储配置
    #[serde(default)]
    pub stores: StoresConfig,
    /// Stream configuration / 文件流配置
    #[serde(default)]
    pub stream: StreamConfig,
    /// Retry configuration / 重试配置
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Stores created at startup, one per scheme / 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoresConfig {
    /// `s3://` store
    #[serde(default)]
    pub s3: Option<S3Config>,
    /// `file://` store
    #[serde(default)]
    pub local: Option<LocalConfig>,
    /// `mem://` store
    #[serde(default = "default_true")]
    pub memory: bool,
}

/// File stream configuration / 文件流配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Pending writes above this many bytes are moved to the temp file / 写缓冲阈值
    #[serde(default = "default_buffer_threshold")]
    pub buffer_threshold: usize,
    /// Directory for temp files; system temp dir when unset / 临时文件目录
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

/// Retry configuration / 重试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt / 最大重试次数
    pub max_retries: u32,
    /// Linear back-off step in milliseconds / 重试间隔
    pub base_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_buffer_threshold() -> usize {
    1024 * 1024
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            s3: None,
            local: None,
            memory: true,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: default_buffer_threshold(),
            temp_dir: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_interval_ms: 20_000,
        }
    }
}

impl StreamConfig {
    /// Get the temp directory / 获取临时文件目录
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_interval_ms))
    }
}

impl AppConfig {
    /// Build a store manager with every configured store / 根据配置创建存储管理器
    pub async fn build_manager(&self) -> anyhow::Result<StoreManager> {
        let manager = StoreManager::new()
            .with_stream_config(self.stream.clone())
            .with_retry(self.retry.policy());
        crate::register_store_factories(&manager).await;

        if self.stores.memory {
            manager.create_store("mem", serde_json::json!({})).await?;
        }
        if let Some(local) = &self.stores.local {
            manager
                .create_store("file", serde_json::to_value(local)?)
                .await
                .context("Failed to create local store")?;
        }
        if let Some(s3) = &self.stores.s3 {
            manager
                .create_store("s3", serde_json::to_value(s3)?)
                .await
                .context("Failed to create S3 store")?;
        }
        Ok(manager)
    }
}

/// Get the default config file path / 获取配置文件路径
pub fn default_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILE)
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    } else {
        let config = AppConfig::default();
        save_config(&config, path)?;
        tracing::info!("Created default configuration at {:?}", path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write config file {:?}", path))?;
    Ok(())
}

/// Initialize global configuration / 初始化全局配置
pub fn init_config(path: &Path) -> anyhow::Result<Arc<RwLock<AppConfig>>> {
    let config = load_config(path)?;
    let config_arc = Arc::new(RwLock::new(config));
    CONFIG
        .set(config_arc.clone())
        .map_err(|_| anyhow::anyhow!("Config already initialized"))?;
    Ok(config_arc)
}

/// Get global configuration instance / 获取全局配置实例
pub fn get_config() -> Arc<RwLock<AppConfig>> {
    CONFIG
        .get_or_init(|| {
            let config = load_config(&default_config_path()).unwrap_or_default();
            Arc::new(RwLock::new(config))
        })
        .clone()
}

/// Get a read-only snapshot of current config / 获取当前配置的只读快照
pub fn config() -> AppConfig {
    get_config().read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = load_config(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
        assert_eq!(config.stream.buffer_threshold, 1024 * 1024);
        assert_eq!(config.retry.policy(), RetryPolicy::new(3, Duration::from_secs(20)));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{"stream": {"buffer_threshold": 16}, "stores": {"local": {"root": "/srv/buckets"}}}"#,
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.stream.buffer_threshold, 16);
        assert!(config.stream.temp_dir.is_none());
        assert!(config.stores.memory);
        assert_eq!(config.stores.local.unwrap().root, "/srv/buckets");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[tokio::test]
    async fn test_build_manager() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            stores: StoresConfig {
                s3: None,
                local: Some(LocalConfig { root: dir.path().to_string_lossy().to_string() }),
                memory: true,
            },
            ..Default::default()
        };
        let manager = config.build_manager().await.unwrap();
        assert_eq!(manager.list_schemes().await, vec!["file", "mem"]);
        assert_eq!(manager.list_factories().await, vec!["file", "mem", "s3"]);
    }
}
