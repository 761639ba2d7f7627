use docfs_chunk::ChunkError;
use docfs_store::StoreError;
use docfs_types::ObjectId;

/// Errors from namespace operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The element, its parent or one of its ancestors does not exist.
    #[error("element not found: {0}")]
    NotFound(ObjectId),

    /// Empty name, or a name containing the path separator.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Mutation of the root, a cycle-creating move, or an operation applied
    /// to the wrong kind of element.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An explicit id is already in use.
    #[error("duplicate key: {0}")]
    DuplicateKey(ObjectId),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("chunk store error: {0}")]
    Chunk(ChunkError),
}

/// Coarse classification of a [`TreeError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidName,
    InvalidOperation,
    DuplicateKey,
    /// The backing store failed; nothing was partially applied.
    Transaction,
    Io,
}

impl TreeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TreeError::NotFound(_) => ErrorKind::NotFound,
            TreeError::InvalidName(_) => ErrorKind::InvalidName,
            TreeError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            TreeError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            TreeError::Store(StoreError::Io(_)) | TreeError::Chunk(ChunkError::Io(_)) => {
                ErrorKind::Io
            }
            TreeError::Chunk(ChunkError::StreamClosed(_))
            | TreeError::Chunk(ChunkError::InvalidSeek(_))
            | TreeError::Chunk(ChunkError::InvalidConfig(_)) => ErrorKind::InvalidOperation,
            TreeError::Store(_) | TreeError::Chunk(_) => ErrorKind::Transaction,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TreeError::InvalidOperation(msg.into())
    }
}

impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateKey { id, .. } => TreeError::DuplicateKey(id),
            other => TreeError::Store(other),
        }
    }
}

impl From<ChunkError> for TreeError {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::NotFound(id) => TreeError::NotFound(id),
            ChunkError::DuplicateKey(id) => TreeError::DuplicateKey(id),
            ChunkError::Store(store) => store.into(),
            other => TreeError::Chunk(other),
        }
    }
}

/// Result alias for namespace operations.
pub type TreeResult<T> = Result<T, TreeError>;
