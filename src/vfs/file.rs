//! File stream / 文件流
//!
//! One object presented as a seekable stream. The store only supports
//! whole-object writes and ranged reads, so writes accumulate in memory,
//! overflow into a private temp file seeded with the current object, and every
//! flush re-uploads the whole temp file.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::entry::RemoteEntry;
use super::{Copyable, Deletable, Listable};
use crate::error::{Result, StorageError};
use crate::location::RemoteLocation;
use crate::storage::{Listing, StoreBox};

/// Leading bytes of every gzip stream
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reference point of [`FileEntry::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = StorageError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(StorageError::InvalidArgument(format!(
                "whence must be 0, 1 or 2, got {}",
                other
            ))),
        }
    }
}

/// Primary access of an [`OpenMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `r`: keep the object, start at offset 0
    Read,
    /// `w`: delete the object on open
    Write,
    /// `a`: start at the end of the object
    Append,
    /// `x`: fail if the object exists, create it otherwise
    Create,
}

/// Mode of [`FileEntry::open_with`], parsed from `r`, `w`, `a` or `x`
/// with an optional `+` (and an ignored `b`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub access: Access,
    pub plus: bool,
}

impl OpenMode {
    pub const fn new(access: Access, plus: bool) -> Self {
        Self { access, plus }
    }

    pub fn readable(&self) -> bool {
        self.plus || self.access == Access::Read
    }

    pub fn writable(&self) -> bool {
        self.plus || self.access != Access::Read
    }
}

/// `r+`: read and write without truncating
impl Default for OpenMode {
    fn default() -> Self {
        Self::new(Access::Read, true)
    }
}

impl FromStr for OpenMode {
    type Err = StorageError;

    fn from_str(mode: &str) -> Result<Self> {
        let invalid = || StorageError::InvalidArgument(format!("invalid open mode: {:?}", mode));
        let mut access = None;
        let mut plus = false;
        for c in mode.chars() {
            let next = match c {
                'r' => Access::Read,
                'w' => Access::Write,
                'a' => Access::Append,
                'x' => Access::Create,
                '+' if !plus => {
                    plus = true;
                    continue;
                }
                'b' => continue,
                _ => return Err(invalid()),
            };
            if access.replace(next).is_some() {
                return Err(invalid());
            }
        }
        Ok(Self::new(access.ok_or_else(invalid)?, plus))
    }
}

impl TryFrom<&str> for OpenMode {
    type Error = StorageError;

    fn try_from(mode: &str) -> Result<Self> {
        mode.parse()
    }
}

#[derive(Debug)]
pub struct FileEntry {
    entry: RemoteEntry,
    offset: u64,
    /// Unflushed writes starting at `buffer_offset`
    buffer: Vec<u8>,
    buffer_offset: u64,
    temp: Option<PathBuf>,
    closed: bool,
    mode: OpenMode,
    cached_size: Option<u64>,
    gzip: Option<bool>,
}

impl FileEntry {
    pub fn new(store: StoreBox, location: RemoteLocation) -> Result<Self> {
        Self::from_entry(RemoteEntry::new(store, location))
    }

    /// Fails when the entry's location is a bucket root or folder-shaped
    pub fn from_entry(entry: RemoteEntry) -> Result<Self> {
        let location = entry.location();
        if location.is_root() || location.is_folder() {
            return Err(StorageError::InvalidArgument(format!(
                "{} does not name a file",
                location
            )));
        }
        Ok(Self {
            entry: entry.anchored(),
            offset: 0,
            buffer: Vec::new(),
            buffer_offset: 0,
            temp: None,
            closed: true,
            mode: OpenMode::default(),
            cached_size: None,
            gzip: None,
        })
    }

    /// Seed the size cache, e.g. from a listing
    pub(crate) fn with_known_size(mut self, size: Option<u64>) -> Self {
        self.cached_size = size;
        self
    }

    pub fn location(&self) -> &RemoteLocation {
        self.entry.location()
    }

    pub fn entry(&self) -> &RemoteEntry {
        &self.entry
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub fn tell(&self) -> u64 {
        self.offset
    }

    /// Local temp file holding the pending content, if a write reached disk
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_deref()
    }

    /// Mode of the current (or last) open
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Open in `r+` mode. An already-open stream is closed (and flushed) first.
    pub async fn open(&mut self) -> Result<()> {
        self.open_with(OpenMode::default()).await
    }

    /// Open in `mode`: `w` deletes the object, `a` moves to its end, `x` creates it
    /// and fails when it already exists.
    pub async fn open_with(&mut self, mode: OpenMode) -> Result<()> {
        if !self.closed {
            self.close().await?;
        }
        if mode.access == Access::Create && self.exists().await? {
            return Err(StorageError::InvalidState(format!(
                "{} already exists",
                self.location()
            )));
        }

        self.buffer.clear();
        self.buffer_offset = 0;
        self.offset = 0;
        match mode.access {
            Access::Read => {}
            Access::Write => {
                self.delete().await?;
            }
            Access::Append => {
                self.seek(0, Whence::End).await?;
            }
            Access::Create => self.create().await?,
        }
        self.mode = mode;
        self.closed = false;
        Ok(())
    }

    /// Flush, upload and drop the temp file. No-op when already closed.
    ///
    /// The temp file is removed even when the upload fails.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.flush().await;
        self.discard_temp().await;
        self.buffer.clear();
        self.closed = true;
        result
    }

    /// Size of the remote object, fetched once; `None` when it does not exist
    pub async fn size(&mut self) -> Result<Option<u64>> {
        if let Some(size) = self.cached_size {
            return Ok(Some(size));
        }
        let size = self.entry.head().await?.and_then(|meta| meta.size);
        self.cached_size = size;
        Ok(size)
    }

    pub async fn file_size(&mut self) -> Result<Option<u64>> {
        self.size().await
    }

    /// Length of the content reads currently see
    async fn content_len(&mut self) -> Result<u64> {
        if let Some(path) = &self.temp {
            return Ok(tokio::fs::metadata(path).await?.len());
        }
        Ok(self.size().await?.unwrap_or(0))
    }

    /// Move the offset; pending writes are materialized first. Returns the new offset.
    pub async fn seek(&mut self, pos: i64, whence: Whence) -> Result<u64> {
        if whence == Whence::Start && pos < 0 {
            return Err(StorageError::InvalidArgument(format!(
                "negative seek position {}",
                pos
            )));
        }
        self.materialize().await?;

        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.offset,
            Whence::End => self.content_len().await?,
        };
        self.offset = base.saturating_add_signed(pos);
        Ok(self.offset)
    }

    /// Read up to `size` bytes (everything remaining when `None`) from the offset.
    ///
    /// Returns `None` when the object does not exist and nothing was written.
    pub async fn read(&mut self, size: Option<usize>) -> Result<Option<Bytes>> {
        if !self.closed && !self.mode.readable() {
            return Err(StorageError::InvalidState(format!(
                "{} is not open for reading",
                self.location()
            )));
        }
        self.read_at_offset(size).await
    }

    async fn read_at_offset(&mut self, size: Option<usize>) -> Result<Option<Bytes>> {
        self.materialize().await?;

        if let Some(path) = &self.temp {
            let mut file = tokio::fs::File::open(path).await?;
            file.seek(std::io::SeekFrom::Start(self.offset)).await?;
            let mut buf = Vec::new();
            match size {
                Some(n) => {
                    file.take(n as u64).read_to_end(&mut buf).await?;
                }
                None => {
                    file.read_to_end(&mut buf).await?;
                }
            }
            self.offset += buf.len() as u64;
            return Ok(Some(Bytes::from(buf)));
        }

        let Some(total) = self.size().await? else {
            return Ok(None);
        };
        if self.offset >= total || size == Some(0) {
            return Ok(Some(Bytes::new()));
        }
        let end = size.map(|n| self.offset.saturating_add(n as u64).min(total) - 1);
        tracing::debug!("Reading {} from {} to {:?}", self.location(), self.offset, end);

        match self.entry.get_range(self.offset, end).await? {
            Some(data) => {
                self.offset += data.len() as u64;
                Ok(Some(data))
            }
            None => {
                self.cached_size = None;
                Ok(None)
            }
        }
    }

    /// Buffer `data` at the offset. The buffer goes to the temp file once it
    /// grows past the configured threshold.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(StorageError::InvalidState("write to closed file".into()));
        }
        if !self.mode.writable() {
            return Err(StorageError::InvalidState(format!(
                "{} is not open for writing",
                self.location()
            )));
        }
        if self.buffer.is_empty() {
            self.buffer_offset = self.offset;
        }
        self.buffer.extend_from_slice(data);
        self.offset += data.len() as u64;
        self.gzip = None;

        if self.buffer.len() > self.entry.stream_config().buffer_threshold {
            self.materialize().await?;
        }
        Ok(data.len())
    }

    /// Materialize pending writes, then upload the whole temp file as the new object
    pub async fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(StorageError::InvalidState("flush of closed file".into()));
        }
        self.materialize().await?;
        if let Some(path) = &self.temp {
            self.entry.put_file(path).await?;
            tracing::debug!("Uploaded {:?} to {}", path, self.location());
            self.cached_size = None;
            self.gzip = None;
        }
        Ok(())
    }

    /// Write the buffer into the temp file at its start offset
    async fn materialize(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let path = match self.temp.clone() {
            Some(path) => path,
            None => self.create_temp().await?,
        };

        let mut file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
        file.seek(std::io::SeekFrom::Start(self.buffer_offset)).await?;
        file.write_all(&self.buffer).await?;
        file.flush().await?;

        tracing::debug!("{} bytes appended to {:?} at {}", self.buffer.len(), path, self.buffer_offset);
        self.buffer.clear();
        Ok(())
    }

    /// New temp file holding the current remote content
    async fn create_temp(&mut self) -> Result<PathBuf> {
        let dir = self.entry.stream_config().temp_dir();
        let (_file, path) = tempfile::Builder::new()
            .prefix("bucketfs-")
            .tempfile_in(&dir)?
            .keep()
            .map_err(|e| e.error)?;

        if let Err(e) = self.download_into(&path).await {
            remove_temp(&path).await;
            return Err(e);
        }
        tracing::debug!("Temp file created for {}: {:?}", self.location(), path);
        self.temp = Some(path.clone());
        Ok(path)
    }

    async fn download_into(&self, path: &Path) -> Result<()> {
        if let Some(data) = self.entry.get_range(0, None).await? {
            tokio::fs::write(path, &data).await?;
        }
        Ok(())
    }

    async fn discard_temp(&mut self) {
        if let Some(path) = self.temp.take() {
            remove_temp(&path).await;
        }
    }

    /// Uploads an empty object unless one already exists
    pub async fn create(&mut self) -> Result<()> {
        if !self.entry.object_exists().await? {
            self.entry.put(Bytes::new()).await?;
            self.cached_size = Some(0);
        }
        Ok(())
    }

    /// Replace the object with the content of a local file
    pub async fn upload_from_local(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            return Err(StorageError::NotFound(path.display().to_string()));
        }
        self.entry.put_file(path).await?;
        self.cached_size = None;
        self.gzip = None;
        Ok(())
    }

    /// True when the object starts with the gzip magic bytes. The offset is preserved.
    pub async fn is_gzip(&mut self) -> Result<bool> {
        if let Some(gzip) = self.gzip {
            return Ok(gzip);
        }
        self.materialize().await?;
        let gzip = if self.content_len().await? < 2 {
            false
        } else {
            let saved = self.offset;
            self.offset = 0;
            let head = self.read_at_offset(Some(2)).await;
            self.offset = saved;
            let head = head?.unwrap_or_default();
            tracing::debug!("{} begins with {:02x?}", self.location(), &head[..]);
            head[..] == GZIP_MAGIC
        };
        self.gzip = Some(gzip);
        Ok(gzip)
    }

    pub async fn exists(&self) -> Result<bool> {
        self.entry.object_exists().await
    }

    /// Deletes the object (and any `key/` objects under it)
    pub async fn delete(&mut self) -> Result<usize> {
        let deleted = self.entry.delete_all().await?;
        self.cached_size = None;
        self.gzip = None;
        Ok(deleted)
    }

    /// Whole remote content, ignoring any unflushed writes
    pub async fn read_all(&self) -> Result<Option<Bytes>> {
        self.entry.get_range(0, None).await
    }

    /// Deserialize the remote object as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self
            .read_all()
            .await?
            .ok_or_else(|| StorageError::NotFound(self.location().uri()))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Save the remote object to a local file. Returns the bytes written.
    pub async fn download_to(&self, path: impl AsRef<Path>) -> Result<u64> {
        let data = self
            .read_all()
            .await?
            .ok_or_else(|| StorageError::NotFound(self.location().uri()))?;
        tokio::fs::write(path.as_ref(), &data).await?;
        Ok(data.len() as u64)
    }
}

async fn remove_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("Failed to remove temp file {:?}: {}", path, e);
    }
}

impl Drop for FileEntry {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.temp.is_some() || !self.buffer.is_empty() {
            tracing::warn!("{} dropped while open, unflushed writes discarded", self.location());
        }
        if let Some(path) = self.temp.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove temp file {:?}: {}", path, e);
            }
        }
    }
}

#[async_trait]
impl Listable for FileEntry {
    async fn list(&self, delimiter: Option<&str>) -> Result<Listing> {
        self.entry.list(delimiter).await
    }
}

#[async_trait]
impl Deletable for FileEntry {
    async fn delete_all(&self) -> Result<usize> {
        self.entry.delete_all().await
    }
}

#[async_trait]
impl Copyable for FileEntry {
    async fn copy_to(&self, to: &str) -> Result<usize> {
        self.entry.copy_to(to).await
    }

    async fn move_to(&self, to: &str) -> Result<usize> {
        self.entry.move_to(to).await
    }
}
