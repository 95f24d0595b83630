//! `std::io` adapter for [`FileEntry`] / 同步读写适配
//!
//! Each call blocks on the given runtime handle, so the adapter must not be
//! used from inside an async task.

use std::io::{self, Read, Seek, SeekFrom, Write};
use tokio::runtime::Handle;

use super::file::{FileEntry, OpenMode, Whence};

#[derive(Debug)]
pub struct BlockingFileStream {
    inner: FileEntry,
    handle: Handle,
}

impl BlockingFileStream {
    pub fn new(inner: FileEntry, handle: Handle) -> Self {
        Self { inner, handle }
    }

    /// Uses the runtime of the calling thread
    pub fn current(inner: FileEntry) -> io::Result<Self> {
        let handle = Handle::try_current().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self::new(inner, handle))
    }

    pub fn open(&mut self) -> io::Result<()> {
        Ok(self.handle.block_on(self.inner.open())?)
    }

    pub fn open_with(&mut self, mode: OpenMode) -> io::Result<()> {
        Ok(self.handle.block_on(self.inner.open_with(mode))?)
    }

    /// Flush, upload and release the temp file
    pub fn close(&mut self) -> io::Result<()> {
        Ok(self.handle.block_on(self.inner.close())?)
    }

    pub fn get_ref(&self) -> &FileEntry {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut FileEntry {
        &mut self.inner
    }

    pub fn into_inner(self) -> FileEntry {
        self.inner
    }
}

impl Read for BlockingFileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let data = self
            .handle
            .block_on(self.inner.read(Some(buf.len())))?
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, self.inner.location().uri())
            })?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl Write for BlockingFileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.handle.block_on(self.inner.write(buf))?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.handle.block_on(self.inner.flush())?)
    }
}

impl Seek for BlockingFileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (pos, whence) = match pos {
            SeekFrom::Start(n) => {
                let n = i64::try_from(n)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                (n, Whence::Start)
            }
            SeekFrom::Current(n) => (n, Whence::Current),
            SeekFrom::End(n) => (n, Whence::End),
        };
        Ok(self.handle.block_on(self.inner.seek(pos, whence))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryStore;
    use crate::location::RemoteLocation;
    use crate::storage::ObjectStore;
    use bytes::Bytes;
    use std::sync::Arc;

    fn stream(store: &Arc<MemoryStore>, rt: &tokio::runtime::Runtime, uri: &str) -> BlockingFileStream {
        let file = FileEntry::new(store.clone(), RemoteLocation::parse(uri).unwrap()).unwrap();
        BlockingFileStream::new(file, rt.handle().clone())
    }

    #[test]
    fn test_std_io_round_trip() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut s = stream(&store, &rt, "mem://t/notes.txt");

        s.open().unwrap();
        s.write_all(b"line one\nline two\n").unwrap();
        s.seek(SeekFrom::Start(5)).unwrap();
        let mut rest = String::new();
        s.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "one\nline two\n");
        s.close().unwrap();

        let stored = rt.block_on(store.get_range("t", "notes.txt", 0, None)).unwrap().unwrap();
        assert_eq!(stored, Bytes::from("line one\nline two\n"));
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut s = stream(&store, &rt, "mem://t/absent.txt");
        let mut buf = [0u8; 4];
        assert_eq!(s.read(&mut buf).unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_closed_write_and_bad_seek() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut s = stream(&store, &rt, "mem://t/a.txt");
        assert!(s.write(b"x").is_err());
        assert_eq!(s.seek(SeekFrom::Start(u64::MAX)).unwrap_err().kind(), io::ErrorKind::InvalidInput);
        assert_eq!(s.seek(SeekFrom::Current(-4)).unwrap(), 0);
    }

    #[test]
    fn test_append_mode() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        rt.block_on(store.put("t", "log.txt", Bytes::from("a\n"))).unwrap();
        let mut s = stream(&store, &rt, "mem://t/log.txt");

        s.open_with("a".parse().unwrap()).unwrap();
        s.write_all(b"b\n").unwrap();
        s.close().unwrap();

        let stored = rt.block_on(store.get_range("t", "log.txt", 0, None)).unwrap().unwrap();
        assert_eq!(stored, Bytes::from("a\nb\n"));
    }
}
