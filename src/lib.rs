//! Virtual filesystem over flat object stores / 对象存储虚拟文件系统
//!
//! URIs such as `s3://bucket/path/` resolve through a [`StoreManager`] to a
//! shared store handle and a [`RemoteLocation`]. [`FolderEntry`] lists direct
//! children with delimiter listings; [`FileEntry`] exposes one object as a
//! seekable, buffered stream.

pub mod config;
pub mod error;
pub mod location;
pub mod logging;
pub mod retry;
pub mod storage;
pub mod vfs;

// Store modules (point to project root drivers via path attribute) / 存储驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use error::{Result, StorageError};
pub use location::RemoteLocation;
pub use storage::{ObjectStore, StoreManager};
pub use vfs::{Copyable, Deletable, FileEntry, FolderEntry, Listable, OpenMode, RemoteEntry, Whence};

/// Register all store factories (`file`, `mem`, `s3`) / 注册所有存储工厂
pub async fn register_store_factories(manager: &StoreManager) {
    drivers::register_all(manager).await
}
