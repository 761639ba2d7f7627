use docfs_store::StoreError;
use docfs_types::ObjectId;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// No live chunk map with this id.
    #[error("chunk map not found: {0}")]
    NotFound(ObjectId),

    /// A chunk map with this id already exists.
    #[error("chunk map already exists: {0}")]
    DuplicateKey(ObjectId),

    /// The stream was finalized, closed or poisoned by an earlier failure.
    #[error("stream for {0} is closed")]
    StreamClosed(ObjectId),

    /// A chunk referenced by a map is missing from the store.
    #[error("chunk {chunk} of {map} is missing")]
    MissingChunk { map: ObjectId, chunk: ObjectId },

    /// Seek to a negative position.
    #[error("invalid seek to {0}")]
    InvalidSeek(i128),

    #[error("invalid chunk store configuration: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for chunk store operations.
pub type ChunkResult<T> = Result<T, ChunkError>;
