use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, ChunkResult};

/// Chunk store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkStoreConfig {
    /// Upper bound on the size of a single chunk, in bytes.
    pub max_chunk_length: usize,
    /// Read size used when copying from or to external readers and writers.
    pub buffer_length: usize,
}

impl ChunkStoreConfig {
    pub fn validate(&self) -> ChunkResult<()> {
        if self.max_chunk_length == 0 {
            return Err(ChunkError::InvalidConfig(
                "max_chunk_length must be positive".into(),
            ));
        }
        if self.buffer_length == 0 {
            return Err(ChunkError::InvalidConfig(
                "buffer_length must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ChunkStoreConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: 1024 * 1024,
            buffer_length: 1024,
        }
    }
}
