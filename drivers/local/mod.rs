//! Local directory store (`file://bucket/key`)

pub mod driver;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{Result, StorageError};
use crate::storage::{ObjectStore, StoreFactory};

pub use driver::LocalStore;

/// Local store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Directory holding one sub-directory per bucket
    pub root: String,
}

pub struct LocalStoreFactory;

impl StoreFactory for LocalStoreFactory {
    fn scheme(&self) -> &'static str {
        "file"
    }

    fn create_store(&self, config: Value) -> Result<Box<dyn ObjectStore>> {
        let config: LocalConfig = serde_json::from_value(config)?;
        if config.root.is_empty() {
            return Err(StorageError::InvalidArgument("缺少 root 配置".into()));
        }

        let root = PathBuf::from(&config.root);
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        let canonical_root = root.canonicalize()?;

        tracing::info!("Local store initialized, root: {:?}", canonical_root);
        Ok(Box::new(LocalStore::new(canonical_root)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_factory_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("root");
        let store = LocalStoreFactory
            .create_store(serde_json::json!({ "root": root.to_string_lossy() }))
            .unwrap();
        assert_eq!(store.name(), "local");
        assert!(root.is_dir());
    }

    #[test]
    fn test_factory_requires_root() {
        assert!(LocalStoreFactory.create_store(serde_json::json!({ "root": "" })).is_err());
        assert!(LocalStoreFactory.create_store(serde_json::json!({})).is_err());
    }
}
