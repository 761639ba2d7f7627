use std::path::Path;
use std::sync::Arc;

use docfs_chunk::ChunkStore;
use docfs_lock::{keys, NamedLockManager};
use docfs_store::{DocumentStore, Filter, MemoryStore, Transaction};
use docfs_tree::{Directories, Elements, Files};
use docfs_types::{Element, ObjectId};
use tracing::info;

use crate::accounts::Accounts;
use crate::config::FsConfig;
use crate::error::{SdkError, SdkResult};

/// What startup recovery removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Tombstoned objects whose chunks were deleted.
    pub reclaimed: Vec<ObjectId>,
    /// File elements deleted because their content no longer exists.
    pub dangling: Vec<ObjectId>,
}

/// A docfs instance over one document store.
///
/// All handles share the store and one lock table, so operations through
/// any of them are serialized against each other.
pub struct DocFs<S> {
    store: Arc<S>,
    locks: NamedLockManager,
    chunks: ChunkStore<S>,
    files: Files<S>,
    directories: Directories<S>,
    accounts: Accounts<S>,
    config: FsConfig,
}

impl<S: DocumentStore> DocFs<S> {
    /// Bind to `store`, creating the root directory if needed and running
    /// recovery when `sweep_on_open` is set.
    pub async fn open(store: Arc<S>, config: FsConfig) -> SdkResult<Self> {
        config.validate()?;
        let locks = NamedLockManager::new();
        let chunks = ChunkStore::new(Arc::clone(&store), locks.clone(), config.chunks.clone())?;
        let elements = Elements::open(Arc::clone(&store), locks.clone()).await?;
        let files = Files::new(elements, chunks.clone());
        let directories = Directories::new(files.clone());
        let accounts = Accounts::new(Arc::clone(&store), locks.clone(), directories.clone());
        let fs = Self {
            store,
            locks,
            chunks,
            files,
            directories,
            accounts,
            config,
        };
        if fs.config.sweep_on_open {
            fs.recover().await?;
        }
        Ok(fs)
    }

    /// Reclaim tombstoned objects, then drop file elements left pointing at
    /// content that is gone. Each element is rechecked under its lock, so a
    /// file being written concurrently is left alone.
    pub async fn recover(&self) -> SdkResult<RecoveryReport> {
        let reclaimed = self.chunks.sweep().await?;
        let mut dangling = Vec::new();
        for file in self
            .store
            .find(&Filter::new(|e: &Element| e.is_file()))
            .await?
        {
            if self.chunks.stat(&file.id).await?.is_some() {
                continue;
            }
            let _guard = self.locks.acquire_writer(keys::element(&file.id)).await;
            if self.chunks.stat(&file.id).await?.is_some() {
                continue;
            }
            let mut tx = Transaction::new();
            tx.delete::<Element>(&file.id);
            self.store.commit(tx).await?;
            dangling.push(file.id);
        }
        info!(
            reclaimed = reclaimed.len(),
            dangling = dangling.len(),
            "recovery complete"
        );
        Ok(RecoveryReport {
            reclaimed,
            dangling,
        })
    }

    /// Any element by id, directory or file, removed or not.
    pub async fn element(&self, id: &ObjectId) -> SdkResult<Option<Element>> {
        Ok(self.files.elements().fetch(id).await?)
    }

    pub fn directories(&self) -> &Directories<S> {
        &self.directories
    }

    pub fn files(&self) -> &Files<S> {
        &self.files
    }

    pub fn chunks(&self) -> &ChunkStore<S> {
        &self.chunks
    }

    pub fn accounts(&self) -> &Accounts<S> {
        &self.accounts
    }

    pub fn locks(&self) -> &NamedLockManager {
        &self.locks
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn root_id(&self) -> &ObjectId {
        self.directories.root_id()
    }
}

impl DocFs<MemoryStore> {
    /// Open an in-memory instance, loading `config.snapshot_path` if it
    /// names an existing file.
    pub async fn open_snapshot(config: FsConfig) -> SdkResult<Self> {
        let store = match &config.snapshot_path {
            Some(path) => MemoryStore::open(path)?,
            None => MemoryStore::new(),
        };
        Self::open(Arc::new(store), config).await
    }

    /// Write the store to the configured snapshot path.
    pub fn save_snapshot(&self) -> SdkResult<()> {
        let path = self
            .config
            .snapshot_path
            .as_ref()
            .ok_or_else(|| SdkError::Config("no snapshot path configured".into()))?;
        self.save_snapshot_to(path)
    }

    pub fn save_snapshot_to(&self, path: impl AsRef<Path>) -> SdkResult<()> {
        self.store.save(path)?;
        Ok(())
    }
}
