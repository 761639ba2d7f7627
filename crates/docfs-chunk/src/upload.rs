use std::sync::Arc;

use docfs_lock::LockGuard;
use docfs_store::{DocumentStore, Transaction, Update};
use docfs_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{ChunkError, ChunkResult};
use crate::model::{Chunk, ChunkMap};

/// Append-only writer for one object.
///
/// Holds the object's chunk lock as a writer until [`flush`](Self::flush).
/// Each full chunk is persisted as soon as it is buffered; the remainder is
/// persisted by `flush`, which also clears the map's tombstone. A stream
/// dropped before `flush` leaves the map tombstoned for the sweeper.
pub struct UploadStream<S: DocumentStore> {
    store: Arc<S>,
    id: ObjectId,
    chunk_size: usize,
    buffer: Vec<u8>,
    length: u64,
    chunk_ids: Vec<ObjectId>,
    guard: Option<LockGuard>,
    finished: bool,
}

impl<S: DocumentStore> UploadStream<S> {
    pub(crate) fn new(store: Arc<S>, id: ObjectId, chunk_size: usize, guard: LockGuard) -> Self {
        Self {
            store,
            id,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            length: 0,
            chunk_ids: Vec::new(),
            guard: Some(guard),
            finished: false,
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Bytes accepted so far, buffered or persisted.
    pub fn len(&self) -> u64 {
        self.length + self.buffer.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn write(&mut self, mut data: &[u8]) -> ChunkResult<()> {
        if self.guard.is_none() {
            return Err(ChunkError::StreamClosed(self.id.clone()));
        }
        while !data.is_empty() {
            let room = self.chunk_size - self.buffer.len();
            let take = room.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == self.chunk_size {
                let full = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
                self.persist(full, None).await?;
            }
        }
        Ok(())
    }

    /// Persist buffered bytes, mark the object complete and release the
    /// chunk lock. Calling it again after success is a no-op.
    pub async fn flush(&mut self) -> ChunkResult<()> {
        self.finalize(Transaction::new()).await
    }

    /// Flush and return the final chunk map.
    pub async fn close(mut self) -> ChunkResult<ChunkMap> {
        self.flush().await?;
        Ok(self.final_map())
    }

    /// Flush, committing the operations staged in `tx` in the same
    /// transaction that makes the object visible. Either both land or the
    /// object stays tombstoned.
    pub async fn finish(mut self, tx: Transaction) -> ChunkResult<ChunkMap> {
        self.finalize(tx).await?;
        Ok(self.final_map())
    }

    async fn finalize(&mut self, tx: Transaction) -> ChunkResult<()> {
        if self.guard.is_none() {
            return if self.finished && tx.is_empty() {
                Ok(())
            } else {
                Err(ChunkError::StreamClosed(self.id.clone()))
            };
        }
        let rest = std::mem::take(&mut self.buffer);
        self.persist(rest, Some(tx)).await?;
        self.finished = true;
        self.guard = None;
        debug!(id = %self.id, length = self.length, chunks = self.chunk_ids.len(), "upload complete");
        Ok(())
    }

    /// Stage the buffered remainder as a chunk in `tx` without committing,
    /// returning every chunk id and the total length. The map stays
    /// tombstoned and the lock stays held until [`release`](Self::release).
    pub(crate) fn seal(&mut self, tx: &mut Transaction) -> ChunkResult<(Vec<ObjectId>, u64)> {
        if self.guard.is_none() {
            return Err(ChunkError::StreamClosed(self.id.clone()));
        }
        let mut chunk_ids = self.chunk_ids.clone();
        let rest = std::mem::take(&mut self.buffer);
        let length = self.length + rest.len() as u64;
        if !rest.is_empty() {
            let chunk = Chunk::new(rest);
            tx.insert(&chunk)?;
            chunk_ids.push(chunk.id);
        }
        Ok((chunk_ids, length))
    }

    /// Drop the lock of a sealed stream whose chunks were adopted elsewhere.
    pub(crate) fn release(mut self) {
        self.finished = true;
        self.guard = None;
    }

    fn final_map(&mut self) -> ChunkMap {
        ChunkMap {
            id: self.id.clone(),
            length: self.length,
            chunk_size: self.chunk_size as u64,
            chunk_ids: std::mem::take(&mut self.chunk_ids),
            removed: false,
        }
    }

    /// Insert `bytes` as the next chunk and extend the map in one
    /// transaction; `finalize` also clears the tombstone. A failed commit
    /// poisons the stream and releases its lock.
    async fn persist(&mut self, bytes: Vec<u8>, finalize: Option<Transaction>) -> ChunkResult<()> {
        match self.try_persist(bytes, finalize).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(id = %self.id, error = %e, "chunk persist failed; upload abandoned");
                self.buffer.clear();
                self.guard = None;
                Err(e)
            }
        }
    }

    async fn try_persist(
        &mut self,
        bytes: Vec<u8>,
        finalize: Option<Transaction>,
    ) -> ChunkResult<()> {
        let added = bytes.len() as u64;
        let finalizing = finalize.is_some();
        let mut tx = finalize.unwrap_or_default();
        let chunk_id = if bytes.is_empty() {
            None
        } else {
            let chunk = Chunk::new(bytes);
            tx.insert(&chunk)?;
            Some(chunk.id)
        };

        let appended = chunk_id.clone();
        tx.update(
            &self.id,
            Update::set(move |map: &mut ChunkMap| {
                if let Some(id) = &appended {
                    map.length += added;
                    map.chunk_ids.push(id.clone());
                }
                if finalizing {
                    map.removed = false;
                }
            }),
        );
        self.store.commit(tx).await?;

        self.length += added;
        if let Some(id) = chunk_id {
            debug!(map = %self.id, chunk = %id, bytes = added, "chunk persisted");
            self.chunk_ids.push(id);
        }
        Ok(())
    }
}

impl<S: DocumentStore> Drop for UploadStream<S> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            warn!(id = %self.id, "upload dropped before flush; left for sweep");
        }
    }
}
