use docfs_types::ObjectId;

/// Errors from document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this id already exists in the collection.
    #[error("duplicate key {id} in {collection}")]
    DuplicateKey {
        collection: &'static str,
        id: ObjectId,
    },

    /// The record targeted by an update or replace does not exist.
    #[error("{collection} record not found: {id}")]
    NotFound {
        collection: &'static str,
        id: ObjectId,
    },

    /// A transaction was rolled back; nothing it staged was applied.
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    /// An update tried to change a record's id.
    #[error("update changed record id from {expected} to {found}")]
    IdMismatch { expected: ObjectId, found: ObjectId },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A snapshot file failed validation.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
