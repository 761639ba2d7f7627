//! High-level SDK for docfs.
//!
//! [`DocFs`] wires the lock manager, chunk store and namespace tree over one
//! document store and runs crash recovery on open. [`blocking::DocFs`] wraps
//! it for synchronous callers. This is the main entry point for
//! applications embedding docfs.

pub mod accounts;
pub mod blocking;
pub mod config;
pub mod error;
pub mod fs;

pub use accounts::Accounts;
pub use config::FsConfig;
pub use error::{SdkError, SdkResult};
pub use fs::{DocFs, RecoveryReport};

// Re-export key types
pub use docfs_chunk::{ChunkMap, ChunkStore, ChunkStoreConfig};
pub use docfs_lock::NamedLockManager;
pub use docfs_store::{DocumentStore, MemoryStore};
pub use docfs_tree::{
    Condition, Directories, ElementQuery, ErrorKind, Field, FileDownloadStream, FileUploadStream,
    Files, TreeError,
};
pub use docfs_types::{
    Element, ElementKind, Group, MetadataKey, MetadataValue, ObjectId, User, UserRole,
};
