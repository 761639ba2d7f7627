use std::io::SeekFrom;

use docfs_lock::LockGuard;
use docfs_store::{DocumentStore, Filter};
use docfs_types::ObjectId;
use tracing::debug;

use crate::error::{ChunkError, ChunkResult};
use crate::model::{Chunk, ChunkMap};
use crate::store::ChunkStore;

/// Seekable reader over one object.
///
/// Holds the object's chunk lock as a reader until closed or dropped, so
/// the chunks it reads cannot be reclaimed underneath it. Chunks are
/// fetched lazily, one at a time.
pub struct DownloadStream<S: DocumentStore> {
    chunks: ChunkStore<S>,
    map: ChunkMap,
    position: u64,
    current: Option<(usize, Vec<u8>)>,
    guard: Option<LockGuard>,
}

impl<S: DocumentStore> DownloadStream<S> {
    pub(crate) fn new(chunks: ChunkStore<S>, map: ChunkMap, guard: LockGuard) -> Self {
        Self {
            chunks,
            map,
            position: 0,
            current: None,
            guard: Some(guard),
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.map.id
    }

    pub fn len(&self) -> u64 {
        self.map.length
    }

    pub fn is_empty(&self) -> bool {
        self.map.length == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn map(&self) -> &ChunkMap {
        &self.map
    }

    /// Move the read position.
    ///
    /// Positions beyond the end clamp to the last byte (`length - 1`, or 0
    /// for an empty object). Seeking exactly to `length` is allowed and
    /// reads nothing.
    pub async fn seek(&mut self, pos: SeekFrom) -> ChunkResult<u64> {
        self.ensure_open()?;
        let length = self.map.length as i128;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::End(n) => length + n as i128,
            SeekFrom::Current(n) => self.position as i128 + n as i128,
        };
        if target < 0 {
            return Err(ChunkError::InvalidSeek(target));
        }
        let target = if target > length {
            self.map.length.saturating_sub(1)
        } else {
            target as u64
        };
        self.position = target;
        if target < self.map.length {
            let (index, _) = self.map.locate(target);
            self.load(index).await?;
        }
        Ok(target)
    }

    /// Read up to `buf.len()` bytes from the current position. Returns 0 at
    /// the end of the object.
    pub async fn read(&mut self, buf: &mut [u8]) -> ChunkResult<usize> {
        self.ensure_open()?;
        if buf.is_empty() || self.position >= self.map.length {
            return Ok(0);
        }
        let (index, offset) = self.map.locate(self.position);
        let chunk = self.load(index).await?;
        let available = chunk.get(offset..).unwrap_or_default();
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n as u64;
        Ok(n)
    }

    /// Read from the current position to the end.
    pub async fn read_to_end(&mut self) -> ChunkResult<Vec<u8>> {
        let remaining = self.map.length.saturating_sub(self.position) as usize;
        let mut out = vec![0u8; remaining];
        let mut filled = 0;
        while filled < remaining {
            let n = self.read(&mut out[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out.truncate(filled);
        Ok(out)
    }

    /// Release the chunk lock, then reclaim the object if it was removed
    /// while this stream was open.
    pub async fn close(mut self) -> ChunkResult<()> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        self.chunks.locks().release(guard);
        self.current = None;

        let id = self.map.id.clone();
        let tombstoned = self
            .chunks
            .store()
            .find_one::<ChunkMap>(&Filter::by_id(&id))
            .await?
            .is_some_and(|m| m.removed);
        if tombstoned {
            debug!(id = %id, "closing reader of removed object");
            self.chunks.reclaim(&id).await?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> ChunkResult<()> {
        if self.guard.is_none() {
            return Err(ChunkError::StreamClosed(self.map.id.clone()));
        }
        Ok(())
    }

    async fn load(&mut self, index: usize) -> ChunkResult<&[u8]> {
        let cached = matches!(&self.current, Some((i, _)) if *i == index);
        if !cached {
            let chunk_id = self
                .map
                .chunk_ids
                .get(index)
                .cloned()
                .ok_or_else(|| ChunkError::NotFound(self.map.id.clone()))?;
            let chunk = self
                .chunks
                .store()
                .find_one::<Chunk>(&Filter::by_id(&chunk_id))
                .await?
                .ok_or_else(|| ChunkError::MissingChunk {
                    map: self.map.id.clone(),
                    chunk: chunk_id.clone(),
                })?;
            self.current = Some((index, chunk.bytes));
        }
        Ok(self
            .current
            .as_ref()
            .map(|(_, bytes)| bytes.as_slice())
            .unwrap_or_default())
    }
}
