use std::fmt;

use docfs_types::ObjectId;
use tracing::debug;

use crate::codec::{decode, encode};
use crate::document::{Document, Update};
use crate::error::{StoreError, StoreResult};

type RawUpdate = Box<dyn Fn(&[u8]) -> StoreResult<Vec<u8>> + Send + Sync>;

pub(crate) enum TxOp {
    Insert {
        collection: &'static str,
        id: ObjectId,
        bytes: Vec<u8>,
    },
    Replace {
        collection: &'static str,
        id: ObjectId,
        bytes: Vec<u8>,
    },
    Update {
        collection: &'static str,
        id: ObjectId,
        apply: RawUpdate,
    },
    Delete {
        collection: &'static str,
        id: ObjectId,
    },
}

impl TxOp {
    pub(crate) fn collection(&self) -> &'static str {
        match self {
            TxOp::Insert { collection, .. }
            | TxOp::Replace { collection, .. }
            | TxOp::Update { collection, .. }
            | TxOp::Delete { collection, .. } => collection,
        }
    }
}

/// A batch of writes committed atomically by [`DocumentStore::commit`].
///
/// Operations are applied in staging order. If any of them fails (an insert
/// hits a taken id, an update or replace finds no record) the whole batch is
/// rolled back. Dropping a transaction without committing discards it.
///
/// [`DocumentStore::commit`]: crate::DocumentStore::commit
#[derive(Default)]
pub struct Transaction {
    pub(crate) ops: Vec<TxOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Document>(&mut self, doc: &T) -> StoreResult<&mut Self> {
        self.ops.push(TxOp::Insert {
            collection: T::COLLECTION,
            id: doc.id().clone(),
            bytes: encode(doc)?,
        });
        Ok(self)
    }

    /// Overwrite an existing record.
    pub fn replace<T: Document>(&mut self, doc: &T) -> StoreResult<&mut Self> {
        self.ops.push(TxOp::Replace {
            collection: T::COLLECTION,
            id: doc.id().clone(),
            bytes: encode(doc)?,
        });
        Ok(self)
    }

    /// Apply `update` to the existing record `id`.
    pub fn update<T: Document>(&mut self, id: &ObjectId, update: Update<T>) -> &mut Self {
        let expected = id.clone();
        let apply: RawUpdate = Box::new(move |bytes: &[u8]| {
            let mut doc: T = decode(bytes)?;
            update.apply(&mut doc);
            if doc.id() != &expected {
                return Err(StoreError::IdMismatch {
                    expected: expected.clone(),
                    found: doc.id().clone(),
                });
            }
            encode(&doc)
        });
        self.ops.push(TxOp::Update {
            collection: T::COLLECTION,
            id: id.clone(),
            apply,
        });
        self
    }

    /// Delete record `id`; deleting a missing record is not an error.
    pub fn delete<T: Document>(&mut self, id: &ObjectId) -> &mut Self {
        self.ops.push(TxOp::Delete {
            collection: T::COLLECTION,
            id: id.clone(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Discard every staged operation.
    pub fn abort(self) {
        debug!(ops = self.ops.len(), "transaction aborted");
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let collections: Vec<&str> = self.ops.iter().map(TxOp::collection).collect();
        f.debug_struct("Transaction")
            .field("ops", &self.ops.len())
            .field("collections", &collections)
            .finish()
    }
}
