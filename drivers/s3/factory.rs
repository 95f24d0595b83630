//! S3驱动工厂

use serde_json::Value;

use crate::error::Result;
use crate::storage::{ObjectStore, StoreFactory};
use super::config::S3Config;
use super::driver::S3Store;

/// S3驱动工厂
pub struct S3StoreFactory;

impl StoreFactory for S3StoreFactory {
    fn scheme(&self) -> &'static str {
        "s3"
    }

    fn create_store(&self, config: Value) -> Result<Box<dyn ObjectStore>> {
        let config: S3Config = serde_json::from_value(config)?;
        Ok(Box::new(S3Store::new(config)?))
    }
}
