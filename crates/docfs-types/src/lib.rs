//! Foundation types for docfs.
//!
//! Every other docfs crate depends on `docfs-types`. The types here are plain
//! data: they carry no storage or locking behaviour of their own.
//!
//! # Key Types
//!
//! - [`ObjectId`]: opaque store identifier (UUID v7 when generated)
//! - [`Element`]: a node of the namespace tree, either a directory or a file
//! - [`SystemMetadata`] / [`MetadataKey`]: the closed set of reserved metadata
//! - [`MetadataValue`]: typed value for custom and reserved metadata
//! - [`User`] / [`Group`]: access-control records (data only)

pub mod access;
pub mod element;
pub mod error;
pub mod id;
pub mod metadata;

pub use access::{Group, User, UserRole};
pub use element::{Element, ElementKind, ROOT_NAME};
pub use error::TypeError;
pub use id::ObjectId;
pub use metadata::{MetadataKey, MetadataValue, SystemMetadata};

/// Wall-clock timestamp used for every element time field.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current UTC time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
