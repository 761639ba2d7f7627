//! Chunked binary storage for docfs.
//!
//! Arbitrarily large byte streams are split into bounded [`Chunk`] records
//! and indexed by a [`ChunkMap`]. Objects are written once through an
//! [`UploadStream`] and read any number of times through a seekable
//! [`DownloadStream`].
//!
//! # Lifecycle
//!
//! A chunk map is created tombstoned (`removed = true`) and only becomes
//! visible when its upload is flushed, so a crashed or abandoned upload is
//! indistinguishable from a removed object. Removal only sets the tombstone;
//! the chunks are reclaimed later, either by the last reader to close or by
//! [`ChunkStore::sweep`].
//!
//! # Locking
//!
//! Each object `id` has two named locks: `ChunkMap.{id}` guards the map
//! record and `Chunk.{id}` guards the chunk contents for the lifetime of a
//! stream. Uploads hold the chunk lock as a writer, downloads as a reader.
//! When both are taken, the chunk-map lock comes first.

pub mod config;
pub mod download;
pub mod error;
pub mod model;
pub mod store;
pub mod upload;

pub use config::ChunkStoreConfig;
pub use download::DownloadStream;
pub use error::{ChunkError, ChunkResult};
pub use model::{Chunk, ChunkMap};
pub use store::ChunkStore;
pub use upload::UploadStream;
