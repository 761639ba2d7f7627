//! Lock names shared by the chunk store and the namespace tree.

use std::fmt::Display;

/// Guards the chunk-map record `id`.
pub fn chunk_map(id: impl Display) -> String {
    format!("ChunkMap.{id}")
}

/// Guards the chunk contents of object `id`; held for a stream's lifetime.
pub fn chunk(id: impl Display) -> String {
    format!("Chunk.{id}")
}

/// Guards a single element record.
pub fn element(id: impl Display) -> String {
    format!("Element.{id}")
}

/// Guards the set of children names under directory `parent_id`.
pub fn children(parent_id: impl Display) -> String {
    format!("Children.{parent_id}")
}

/// Serializes creation of the root directory.
pub fn root() -> String {
    "Root".to_string()
}
