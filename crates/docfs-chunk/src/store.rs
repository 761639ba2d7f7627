use std::sync::Arc;

use docfs_lock::{keys, NamedLockManager};
use docfs_store::{DocumentStore, Filter, Transaction, Update};
use docfs_types::ObjectId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::config::ChunkStoreConfig;
use crate::download::DownloadStream;
use crate::error::{ChunkError, ChunkResult};
use crate::model::{Chunk, ChunkMap};
use crate::upload::UploadStream;

/// Chunked object storage on top of a [`DocumentStore`].
///
/// Cloning is cheap; clones share the backing store and lock table.
pub struct ChunkStore<S> {
    store: Arc<S>,
    locks: NamedLockManager,
    config: ChunkStoreConfig,
}

impl<S> Clone for ChunkStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: self.locks.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: DocumentStore> ChunkStore<S> {
    pub fn new(
        store: Arc<S>,
        locks: NamedLockManager,
        config: ChunkStoreConfig,
    ) -> ChunkResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            locks,
            config,
        })
    }

    pub fn config(&self) -> &ChunkStoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn locks(&self) -> &NamedLockManager {
        &self.locks
    }

    // -----------------------------------------------------------------------
    // Streams
    // -----------------------------------------------------------------------

    /// Create a tombstoned chunk map and return a writer for it.
    ///
    /// With an explicit id, fails with [`ChunkError::DuplicateKey`] if a map
    /// with that id already exists.
    pub async fn open_upload(&self, id: Option<ObjectId>) -> ChunkResult<UploadStream<S>> {
        let id = id.unwrap_or_else(ObjectId::generate);
        let map_guard = self.locks.acquire_writer(keys::chunk_map(&id)).await;

        let map = ChunkMap::new(id.clone(), self.config.max_chunk_length as u64);
        if let Err(e) = self.store.insert_one(&map).await {
            return Err(if e.is_duplicate_key() {
                ChunkError::DuplicateKey(id)
            } else {
                e.into()
            });
        }

        let chunk_guard = self.locks.acquire_writer(keys::chunk(&id)).await;
        self.locks.release(map_guard);
        debug!(id = %id, "upload opened");
        Ok(UploadStream::new(
            Arc::clone(&self.store),
            id,
            self.config.max_chunk_length,
            chunk_guard,
        ))
    }

    /// Open a reader on a completed object.
    ///
    /// Waits for an in-flight upload of the same id to finish. A tombstoned
    /// map is reclaimed on the spot when possible and reported as not found.
    pub async fn open_download(&self, id: &ObjectId) -> ChunkResult<DownloadStream<S>> {
        let map_guard = self.locks.acquire_reader(keys::chunk_map(id)).await;
        let chunk_guard = self.locks.acquire_reader(keys::chunk(id)).await;
        let map = self.store.find_one::<ChunkMap>(&Filter::by_id(id)).await?;
        self.locks.release(map_guard);

        match map {
            None => Err(ChunkError::NotFound(id.clone())),
            Some(map) if map.removed => {
                self.locks.release(chunk_guard);
                self.reclaim(id).await?;
                Err(ChunkError::NotFound(id.clone()))
            }
            Some(map) => Ok(DownloadStream::new(self.clone(), map, chunk_guard)),
        }
    }

    // -----------------------------------------------------------------------
    // Whole-object helpers
    // -----------------------------------------------------------------------

    pub async fn upload(&self, bytes: &[u8]) -> ChunkResult<ObjectId> {
        self.upload_bytes(None, bytes).await
    }

    pub async fn upload_with_id(&self, id: ObjectId, bytes: &[u8]) -> ChunkResult<ObjectId> {
        self.upload_bytes(Some(id), bytes).await
    }

    async fn upload_bytes(&self, id: Option<ObjectId>, bytes: &[u8]) -> ChunkResult<ObjectId> {
        let mut stream = self.open_upload(id).await?;
        stream.write(bytes).await?;
        Ok(stream.close().await?.id)
    }

    /// Upload everything `reader` yields, `buffer_length` bytes at a time.
    pub async fn upload_from<R>(&self, id: Option<ObjectId>, reader: &mut R) -> ChunkResult<ChunkMap>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut stream = self.open_upload(id).await?;
        let mut buf = vec![0u8; self.config.buffer_length];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stream.write(&buf[..n]).await?;
        }
        stream.close().await
    }

    pub async fn download(&self, id: &ObjectId) -> ChunkResult<Vec<u8>> {
        let mut stream = self.open_download(id).await?;
        let bytes = stream.read_to_end().await?;
        stream.close().await?;
        Ok(bytes)
    }

    /// Copy the whole object into `writer`. Returns the number of bytes written.
    pub async fn download_to<W>(&self, id: &ObjectId, writer: &mut W) -> ChunkResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut stream = self.open_download(id).await?;
        let mut buf = vec![0u8; self.config.buffer_length];
        let mut total = 0u64;
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            total += n as u64;
        }
        writer.flush().await?;
        stream.close().await?;
        Ok(total)
    }

    /// Chunk map of `id`, tombstoned or not.
    pub async fn stat(&self, id: &ObjectId) -> ChunkResult<Option<ChunkMap>> {
        let _guard = self.locks.acquire_reader(keys::chunk_map(id)).await;
        Ok(self.store.find_one::<ChunkMap>(&Filter::by_id(id)).await?)
    }

    // -----------------------------------------------------------------------
    // Copy and removal
    // -----------------------------------------------------------------------

    /// Copy every chunk of `id` into a new, complete object.
    pub async fn duplicate(&self, id: &ObjectId) -> ChunkResult<ObjectId> {
        let copy = self.duplicate_to(id).await?.close().await?;
        debug!(source = %id, copy = %copy.id, length = copy.length, "object duplicated");
        Ok(copy.id)
    }

    /// Copy the bytes of `id` into a new upload that the caller finishes.
    ///
    /// The copy stays tombstoned until the returned stream is flushed, so
    /// the caller can commit it together with its own records.
    pub async fn duplicate_to(&self, id: &ObjectId) -> ChunkResult<UploadStream<S>> {
        let mut source = self.open_download(id).await?;
        let mut target = match self.open_upload(None).await {
            Ok(t) => t,
            Err(e) => {
                source.close().await?;
                return Err(e);
            }
        };
        let mut buf = vec![0u8; self.config.max_chunk_length];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            target.write(&buf[..n]).await?;
        }
        source.close().await?;
        Ok(target)
    }

    /// Tombstone `id`. Returns whether a map existed.
    pub async fn remove(&self, id: &ObjectId) -> ChunkResult<bool> {
        let _guard = self.locks.acquire_writer(keys::chunk_map(id)).await;
        let found = self
            .store
            .update_one(
                &Filter::by_id(id),
                &Update::set(|m: &mut ChunkMap| m.removed = true),
            )
            .await?;
        debug!(id = %id, found, "object tombstoned");
        Ok(found)
    }

    /// Tombstone every existing object in `ids` and commit `tx` in the same
    /// transaction. Returns how many maps were tombstoned.
    ///
    /// Map locks are taken in id order so concurrent calls over overlapping
    /// sets cannot deadlock.
    pub async fn remove_many(&self, ids: &[ObjectId], mut tx: Transaction) -> ChunkResult<usize> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.locks.acquire_writer(keys::chunk_map(id)).await);
        }
        let mut tombstoned = 0;
        for id in &ids {
            if self.store.count(&Filter::<ChunkMap>::by_id(id)).await? > 0 {
                tx.update(id, Update::set(|m: &mut ChunkMap| m.removed = true));
                tombstoned += 1;
            }
        }
        self.store.commit(tx).await?;
        drop(guards);
        debug!(requested = ids.len(), tombstoned, "objects tombstoned");
        Ok(tombstoned)
    }

    /// Swap the content of the complete object `id` for `bytes`, keeping
    /// its id, and commit `tx` in the same transaction.
    ///
    /// The new bytes go to a tombstoned staging object first. Repointing
    /// `id` at them and deleting its old chunks is a single commit, so on
    /// failure `id` keeps its old content and the staging object is left
    /// to the sweeper.
    pub async fn replace(
        &self,
        id: &ObjectId,
        bytes: &[u8],
        mut tx: Transaction,
    ) -> ChunkResult<ChunkMap> {
        let _map_guard = self.locks.acquire_writer(keys::chunk_map(id)).await;
        let _chunk_guard = self.locks.acquire_writer(keys::chunk(id)).await;
        let old = match self.store.find_one::<ChunkMap>(&Filter::by_id(id)).await? {
            Some(map) if !map.removed => map,
            _ => return Err(ChunkError::NotFound(id.clone())),
        };

        let mut staging = self.open_upload(None).await?;
        staging.write(bytes).await?;
        let (chunk_ids, length) = staging.seal(&mut tx)?;

        for chunk_id in &old.chunk_ids {
            tx.delete::<Chunk>(chunk_id);
        }
        tx.delete::<ChunkMap>(staging.id());
        let chunk_size = self.config.max_chunk_length as u64;
        let adopted = chunk_ids.clone();
        tx.update(
            id,
            Update::set(move |map: &mut ChunkMap| {
                map.length = length;
                map.chunk_size = chunk_size;
                map.chunk_ids = adopted.clone();
                map.removed = false;
            }),
        );
        self.store.commit(tx).await?;
        debug!(id = %id, staging = %staging.id(), length, chunks = chunk_ids.len(), "object content replaced");
        staging.release();

        Ok(ChunkMap {
            id: id.clone(),
            length,
            chunk_size,
            chunk_ids,
            removed: false,
        })
    }

    /// Delete `id` and its chunks now, waiting for open readers to close.
    pub async fn purge(&self, id: &ObjectId) -> ChunkResult<bool> {
        let _map_guard = self.locks.acquire_writer(keys::chunk_map(id)).await;
        let _chunk_guard = self.locks.acquire_writer(keys::chunk(id)).await;
        let Some(map) = self.store.find_one::<ChunkMap>(&Filter::by_id(id)).await? else {
            return Ok(false);
        };
        self.delete_object(&map).await?;
        debug!(id = %id, chunks = map.chunk_count(), "object purged");
        Ok(true)
    }

    /// Reclaim every tombstoned object whose chunk lock is free. Returns the
    /// ids reclaimed.
    pub async fn sweep(&self) -> ChunkResult<Vec<ObjectId>> {
        let tombstoned = self
            .store
            .find(&Filter::new(|m: &ChunkMap| m.removed))
            .await?;
        let mut reclaimed = Vec::new();
        for map in tombstoned {
            if self.reclaim(&map.id).await? {
                reclaimed.push(map.id);
            }
        }
        info!(reclaimed = reclaimed.len(), "chunk sweep complete");
        Ok(reclaimed)
    }

    /// Delete a tombstoned object if nobody holds its chunk lock.
    ///
    /// Losing the race to a reader or writer is not an error: the last
    /// reader, or a later sweep, will reclaim it.
    pub(crate) async fn reclaim(&self, id: &ObjectId) -> ChunkResult<bool> {
        let _map_guard = self.locks.acquire_writer(keys::chunk_map(id)).await;
        let Some(_chunk_guard) = self.locks.try_acquire_writer(keys::chunk(id)) else {
            debug!(id = %id, "object busy; reclaim skipped");
            return Ok(false);
        };
        let map = self.store.find_one::<ChunkMap>(&Filter::by_id(id)).await?;
        match map {
            Some(map) if map.removed => {
                self.delete_object(&map).await?;
                debug!(id = %id, chunks = map.chunk_count(), "object reclaimed");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_object(&self, map: &ChunkMap) -> ChunkResult<()> {
        let mut tx = Transaction::new();
        for chunk_id in &map.chunk_ids {
            tx.delete::<Chunk>(chunk_id);
        }
        tx.delete::<ChunkMap>(&map.id);
        self.store.commit(tx).await?;
        Ok(())
    }
}
