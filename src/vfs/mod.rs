//! Virtual filesystem over a flat object store / 对象存储上的虚拟文件系统
//!
//! Capabilities are split into small traits so folder and file entries only
//! implement what they need; both delegate to a shared [`RemoteEntry`].

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::Listing;

pub mod blocking;
pub mod entry;
pub mod file;
pub mod folder;

pub use blocking::BlockingFileStream;
pub use entry::{copy_destination, rewrite_key, RemoteEntry};
pub use file::{Access, FileEntry, OpenMode, Whence, GZIP_MAGIC};
pub use folder::FolderEntry;

/// Enumerate the objects an entry covers / 列举
#[async_trait]
pub trait Listable {
    /// One listing call; recursive without a delimiter
    async fn list(&self, delimiter: Option<&str>) -> Result<Listing>;

    /// Every key covered by the entry
    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.list(None).await?.keys())
    }
}

/// Remove every object an entry covers / 删除
#[async_trait]
pub trait Deletable {
    /// Returns the number of objects deleted
    async fn delete_all(&self) -> Result<usize>;
}

/// Copy or move the objects an entry covers / 复制与移动
#[async_trait]
pub trait Copyable {
    /// Returns the number of objects copied
    async fn copy_to(&self, to: &str) -> Result<usize>;

    /// Copy then delete the source. Not atomic: a failed delete leaves both copies.
    async fn move_to(&self, to: &str) -> Result<usize>;
}
