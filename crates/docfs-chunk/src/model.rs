use docfs_store::Document;
use docfs_types::ObjectId;
use serde::{Deserialize, Serialize};

/// One bounded slice of an object's bytes. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ObjectId,
    pub bytes: Vec<u8>,
}

impl Chunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            id: ObjectId::generate(),
            bytes,
        }
    }
}

impl Document for Chunk {
    const COLLECTION: &'static str = "chunks";

    fn id(&self) -> &ObjectId {
        &self.id
    }
}

/// Ordered index of the chunks making up one object.
///
/// Every chunk except the last holds exactly `chunk_size` bytes, so the
/// chunk holding offset `o` is `chunk_ids[o / chunk_size]`. `length` is the
/// sum of all chunk lengths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMap {
    pub id: ObjectId,
    pub length: u64,
    pub chunk_size: u64,
    pub chunk_ids: Vec<ObjectId>,
    /// Tombstone. Set at creation and cleared when the upload completes.
    pub removed: bool,
}

impl ChunkMap {
    pub fn new(id: ObjectId, chunk_size: u64) -> Self {
        Self {
            id,
            length: 0,
            chunk_size,
            chunk_ids: Vec::new(),
            removed: true,
        }
    }

    /// Chunk index and intra-chunk offset of byte `offset`.
    pub fn locate(&self, offset: u64) -> (usize, usize) {
        let size = self.chunk_size.max(1);
        ((offset / size) as usize, (offset % size) as usize)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_ids.len()
    }
}

impl Document for ChunkMap {
    const COLLECTION: &'static str = "chunk_maps";

    fn id(&self) -> &ObjectId {
        &self.id
    }
}
