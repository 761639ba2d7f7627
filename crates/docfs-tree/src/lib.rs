//! Hierarchical namespace for docfs.
//!
//! Directories and files live in one `elements` collection, told apart by
//! [`ElementKind`](docfs_types::ElementKind). A file element shares its id
//! with the chunk map holding its content, so the two are created in one
//! transaction and deleted together.
//!
//! # Invariants
//!
//! 1. No two live siblings share a name. Collisions are resolved by suffixing
//!    (see [`naming`]) under the parent's `Children.{id}` lock.
//! 2. The root has no parent and is never renamed, moved or removed.
//! 3. A live element's parent chain ends at the root. Moves into one's own
//!    subtree are rejected.
//! 4. A soft-deleted element records the names and ids of its ancestors so
//!    it can be restored to the same place, even if that place has since
//!    been removed.
//!
//! # Locking
//!
//! Mutations of one element hold its `Element.{id}` writer lock. Placing a
//! name under a parent additionally holds `Children.{parent}`, always taken
//! after any element lock.

pub mod directories;
pub mod elements;
pub mod error;
pub mod files;
pub mod naming;
pub mod search;
pub mod streams;

pub use directories::Directories;
pub use elements::Elements;
pub use error::{ErrorKind, TreeError, TreeResult};
pub use files::Files;
pub use search::{Condition, ElementQuery, Field};
pub use streams::{FileDownloadStream, FileUploadStream};
