//! Blocking facade.
//!
//! [`DocFs`] owns a Tokio runtime and drives the async API on it, so every
//! operation is available to synchronous callers with the same locking and
//! ordering. None of these methods may be called from inside an async
//! runtime.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use docfs_chunk::{ChunkMap, ChunkStore};
use docfs_store::{DocumentStore, MemoryStore};
use docfs_tree::{ElementQuery, FileDownloadStream, FileUploadStream, TreeError};
use docfs_types::{Element, MetadataValue, ObjectId};
use tokio::runtime::{Builder, Runtime};

use crate::config::FsConfig;
use crate::error::SdkResult;
use crate::fs::RecoveryReport;

/// Blocking handle on a docfs instance.
pub struct DocFs<S> {
    rt: Arc<Runtime>,
    inner: crate::DocFs<S>,
}

impl<S: DocumentStore> DocFs<S> {
    pub fn open(store: Arc<S>, config: FsConfig) -> SdkResult<Self> {
        let rt = Arc::new(Builder::new_multi_thread().enable_all().build()?);
        let inner = rt.block_on(crate::DocFs::open(store, config))?;
        Ok(Self { rt, inner })
    }

    /// The async instance this handle drives.
    pub fn inner(&self) -> &crate::DocFs<S> {
        &self.inner
    }

    pub fn root_id(&self) -> &ObjectId {
        self.inner.root_id()
    }

    pub fn recover(&self) -> SdkResult<RecoveryReport> {
        self.rt.block_on(self.inner.recover())
    }

    pub fn element(&self, id: &ObjectId) -> SdkResult<Option<Element>> {
        self.rt.block_on(self.inner.element(id))
    }

    pub fn directories(&self) -> Directories<'_, S> {
        Directories {
            rt: &self.rt,
            inner: self.inner.directories(),
        }
    }

    pub fn files(&self) -> Files<'_, S> {
        Files {
            rt: &self.rt,
            inner: self.inner.files(),
        }
    }

    pub fn chunks(&self) -> Chunks<'_, S> {
        Chunks {
            rt: &self.rt,
            inner: self.inner.chunks(),
        }
    }
}

impl DocFs<MemoryStore> {
    pub fn open_snapshot(config: FsConfig) -> SdkResult<Self> {
        let rt = Arc::new(Builder::new_multi_thread().enable_all().build()?);
        let inner = rt.block_on(crate::DocFs::open_snapshot(config))?;
        Ok(Self { rt, inner })
    }

    pub fn save_snapshot(&self) -> SdkResult<()> {
        self.inner.save_snapshot()
    }
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

pub struct Directories<'a, S> {
    rt: &'a Runtime,
    inner: &'a docfs_tree::Directories<S>,
}

impl<S: DocumentStore> Directories<'_, S> {
    pub fn root(&self) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.root())?)
    }

    pub fn create(&self, parent_id: &ObjectId, name: &str) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.create(parent_id, name))?)
    }

    pub fn get(&self, id: &ObjectId) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.get(id))?)
    }

    pub fn list(&self, id: &ObjectId) -> SdkResult<Vec<Element>> {
        Ok(self.rt.block_on(self.inner.list(id))?)
    }

    pub fn list_recursive(&self, id: &ObjectId) -> SdkResult<Vec<Element>> {
        Ok(self.rt.block_on(self.inner.list_recursive(id))?)
    }

    pub fn move_to(&self, id: &ObjectId, new_parent_id: &ObjectId) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.move_to(id, new_parent_id))?)
    }

    pub fn copy(&self, id: &ObjectId, new_parent_id: &ObjectId) -> SdkResult<Vec<Element>> {
        Ok(self.rt.block_on(self.inner.copy(id, new_parent_id))?)
    }

    pub fn rename(&self, id: &ObjectId, new_name: &str) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.rename(id, new_name))?)
    }

    pub fn remove(&self, id: &ObjectId, permanently: bool) -> SdkResult<()> {
        Ok(self.rt.block_on(self.inner.remove(id, permanently))?)
    }

    pub fn restore(&self, id: &ObjectId) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.restore(id))?)
    }

    pub fn set_custom_metadata(
        &self,
        id: &ObjectId,
        key: &str,
        value: impl Into<MetadataValue>,
    ) -> SdkResult<Element> {
        Ok(self
            .rt
            .block_on(self.inner.set_custom_metadata(id, key, value))?)
    }

    pub fn remove_custom_metadata(&self, id: &ObjectId, key: &str) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.remove_custom_metadata(id, key))?)
    }

    pub fn find(&self, search_root: &ObjectId, query: &ElementQuery) -> SdkResult<Vec<Element>> {
        Ok(self.rt.block_on(self.inner.find(search_root, query))?)
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

pub struct Files<'a, S> {
    rt: &'a Arc<Runtime>,
    inner: &'a docfs_tree::Files<S>,
}

impl<S: DocumentStore> Files<'_, S> {
    pub fn create(&self, parent_id: &ObjectId, name: &str, data: &[u8]) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.create(parent_id, name, data))?)
    }

    /// Create a file from a synchronous reader, streaming it in
    /// `buffer_length` pieces.
    pub fn create_from_reader(
        &self,
        parent_id: &ObjectId,
        name: &str,
        reader: &mut impl io::Read,
    ) -> SdkResult<Element> {
        let mut upload = self.open_upload_stream(parent_id, name)?;
        let mut buf = vec![0u8; self.inner.chunks().config().buffer_length];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            io::Write::write_all(&mut upload, &buf[..n])?;
        }
        upload.close()
    }

    pub fn get(&self, id: &ObjectId) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.get(id))?)
    }

    pub fn download(&self, id: &ObjectId) -> SdkResult<(Vec<u8>, Element)> {
        Ok(self.rt.block_on(self.inner.download(id))?)
    }

    /// Copy the content of `id` into `writer`. Returns the byte count.
    pub fn download_to(&self, id: &ObjectId, writer: &mut impl io::Write) -> SdkResult<u64> {
        let mut download = self.open_download_stream(id)?;
        let copied = io::copy(&mut download, writer)?;
        download.close()?;
        Ok(copied)
    }

    pub fn write(&self, id: &ObjectId, data: &[u8]) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.write(id, data))?)
    }

    pub fn remove(&self, id: &ObjectId, permanently: bool) -> SdkResult<()> {
        Ok(self.rt.block_on(self.inner.remove(id, permanently))?)
    }

    pub fn restore(&self, id: &ObjectId) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.restore(id))?)
    }

    pub fn copy(&self, id: &ObjectId, parent_id: &ObjectId) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.copy(id, parent_id))?)
    }

    pub fn move_to(&self, id: &ObjectId, new_parent_id: &ObjectId) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.move_to(id, new_parent_id))?)
    }

    pub fn rename(&self, id: &ObjectId, new_name: &str) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.rename(id, new_name))?)
    }

    pub fn set_custom_metadata(
        &self,
        id: &ObjectId,
        key: &str,
        value: impl Into<MetadataValue>,
    ) -> SdkResult<Element> {
        Ok(self
            .rt
            .block_on(self.inner.set_custom_metadata(id, key, value))?)
    }

    pub fn remove_custom_metadata(&self, id: &ObjectId, key: &str) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.remove_custom_metadata(id, key))?)
    }

    pub fn open_upload_stream(&self, parent_id: &ObjectId, name: &str) -> SdkResult<BlockingUpload<S>> {
        let inner = self
            .rt
            .block_on(self.inner.open_upload_stream(parent_id, name))?;
        Ok(BlockingUpload {
            rt: Arc::clone(self.rt),
            inner,
        })
    }

    pub fn open_download_stream(&self, id: &ObjectId) -> SdkResult<BlockingDownload<S>> {
        let inner = self.rt.block_on(self.inner.open_download_stream(id))?;
        Ok(BlockingDownload {
            rt: Arc::clone(self.rt),
            inner,
        })
    }
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// Direct access to binary objects, bypassing the namespace.
pub struct Chunks<'a, S> {
    rt: &'a Runtime,
    inner: &'a ChunkStore<S>,
}

impl<S: DocumentStore> Chunks<'_, S> {
    pub fn upload(&self, bytes: &[u8]) -> SdkResult<ObjectId> {
        Ok(self.rt.block_on(self.inner.upload(bytes))?)
    }

    pub fn upload_with_id(&self, id: ObjectId, bytes: &[u8]) -> SdkResult<ObjectId> {
        Ok(self.rt.block_on(self.inner.upload_with_id(id, bytes))?)
    }

    pub fn download(&self, id: &ObjectId) -> SdkResult<Vec<u8>> {
        Ok(self.rt.block_on(self.inner.download(id))?)
    }

    pub fn stat(&self, id: &ObjectId) -> SdkResult<Option<ChunkMap>> {
        Ok(self.rt.block_on(self.inner.stat(id))?)
    }

    pub fn duplicate(&self, id: &ObjectId) -> SdkResult<ObjectId> {
        Ok(self.rt.block_on(self.inner.duplicate(id))?)
    }

    pub fn remove(&self, id: &ObjectId) -> SdkResult<bool> {
        Ok(self.rt.block_on(self.inner.remove(id))?)
    }

    pub fn purge(&self, id: &ObjectId) -> SdkResult<bool> {
        Ok(self.rt.block_on(self.inner.purge(id))?)
    }

    pub fn sweep(&self) -> SdkResult<Vec<ObjectId>> {
        Ok(self.rt.block_on(self.inner.sweep())?)
    }
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// [`io::Write`] adapter over a file upload. The file appears on
/// [`close`](Self::close); dropping the writer discards it.
pub struct BlockingUpload<S: DocumentStore> {
    rt: Arc<Runtime>,
    inner: FileUploadStream<S>,
}

impl<S: DocumentStore> BlockingUpload<S> {
    pub fn id(&self) -> &ObjectId {
        self.inner.id()
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn close(self) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.close())?)
    }
}

impl<S: DocumentStore> io::Write for BlockingUpload<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rt.block_on(self.inner.write(buf)).map_err(to_io)?;
        Ok(buf.len())
    }

    // Content is published by `close`; there is nothing to push early.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// [`io::Read`] + [`io::Seek`] adapter over a file download.
pub struct BlockingDownload<S: DocumentStore> {
    rt: Arc<Runtime>,
    inner: FileDownloadStream<S>,
}

impl<S: DocumentStore> BlockingDownload<S> {
    pub fn element(&self) -> &Element {
        self.inner.element()
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Release the content and record the access.
    pub fn close(self) -> SdkResult<Element> {
        Ok(self.rt.block_on(self.inner.close())?)
    }
}

impl<S: DocumentStore> io::Read for BlockingDownload<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.rt.block_on(self.inner.read(buf)).map_err(to_io)
    }
}

impl<S: DocumentStore> io::Seek for BlockingDownload<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.rt.block_on(self.inner.seek(pos)).map_err(to_io)
    }
}

fn to_io(e: TreeError) -> io::Error {
    use docfs_tree::ErrorKind;
    let kind = match e.kind() {
        ErrorKind::NotFound => io::ErrorKind::NotFound,
        ErrorKind::InvalidName | ErrorKind::InvalidOperation => io::ErrorKind::InvalidInput,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, Write};

    fn fs() -> DocFs<MemoryStore> {
        let mut config = FsConfig::default();
        config.chunks.max_chunk_length = 4;
        DocFs::open(Arc::new(MemoryStore::new()), config).unwrap()
    }

    #[test]
    fn directory_and_file_round_trip() {
        let fs = fs();
        let root = fs.root_id().clone();
        let dir = fs.directories().create(&root, "docs").unwrap();
        let file = fs.files().create(&dir.id, "a.txt", b"hello world").unwrap();
        assert_eq!(fs.directories().list(&dir.id).unwrap(), vec![file.clone()]);
        assert_eq!(fs.files().download(&file.id).unwrap().0, b"hello world");
        assert_eq!(fs.chunks().stat(&file.id).unwrap().unwrap().chunk_count(), 3);
    }

    #[test]
    fn upload_writer_and_download_reader() {
        let fs = fs();
        let root = fs.root_id().clone();
        let mut up = fs.files().open_upload_stream(&root, "log").unwrap();
        write!(up, "line one\nline two\n").unwrap();
        up.flush().unwrap();
        let file = up.close().unwrap();
        assert_eq!(file.length(), 18);

        let mut down = fs.files().open_download_stream(&file.id).unwrap();
        down.seek(SeekFrom::Start(9)).unwrap();
        let mut rest = String::new();
        down.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "line two\n");
        let err = down.seek(SeekFrom::Current(-100)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        down.close().unwrap();
    }

    #[test]
    fn reader_and_writer_helpers() {
        let fs = fs();
        let root = fs.root_id().clone();
        let data: Vec<u8> = (0..100u8).collect();
        let file = fs
            .files()
            .create_from_reader(&root, "bin", &mut data.as_slice())
            .unwrap();
        let mut out = Vec::new();
        assert_eq!(fs.files().download_to(&file.id, &mut out).unwrap(), 100);
        assert_eq!(out, data);
    }

    #[test]
    fn errors_carry_tree_kind() {
        let fs = fs();
        let err = fs.directories().get(&ObjectId::generate()).unwrap_err();
        assert_eq!(err.tree_kind(), Some(docfs_tree::ErrorKind::NotFound));
    }

    #[test]
    fn dropped_upload_is_swept() {
        let fs = fs();
        let root = fs.root_id().clone();
        let mut up = fs.files().open_upload_stream(&root, "tmp").unwrap();
        up.write_all(b"0123456789").unwrap();
        let id = up.id().clone();
        drop(up);
        assert_eq!(fs.chunks().sweep().unwrap(), vec![id]);
        assert_eq!(fs.inner().locks().live_locks(), 0);
    }
}
