// Store package / 存储驱动包
pub mod local;
pub mod memory;
pub mod s3;

use crate::storage::StoreManager;

/// Register all store factories to StoreManager / 注册所有存储工厂
pub async fn register_all(manager: &StoreManager) {
    // Register local directory store / 注册本地存储
    manager.register_factory(Box::new(local::LocalStoreFactory)).await;
    // Register in-memory store / 注册内存存储
    manager.register_factory(Box::new(memory::MemoryStoreFactory)).await;
    // Register S3 store / 注册S3对象存储
    manager.register_factory(Box::new(s3::S3StoreFactory)).await;
}
