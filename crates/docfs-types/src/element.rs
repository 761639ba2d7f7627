use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::ObjectId;
use crate::metadata::{MetadataValue, SystemMetadata};
use crate::Timestamp;

/// Name given to the root directory.
pub const ROOT_NAME: &str = "_";

/// Whether an element is a directory or a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Directory,
    File,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Directory => f.write_str("directory"),
            ElementKind::File => f.write_str("file"),
        }
    }
}

/// A node of the namespace tree.
///
/// The root is the unique element without a parent. A file element shares
/// its id with the chunk map holding its content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ObjectId,
    pub parent_id: Option<ObjectId>,
    pub kind: ElementKind,
    pub name: String,
    pub created: Timestamp,
    pub modified: Timestamp,
    pub opened: Timestamp,
    pub removed: bool,
    pub metadata: SystemMetadata,
    pub custom_metadata: BTreeMap<String, MetadataValue>,
}

impl Element {
    fn new(
        id: ObjectId,
        parent_id: Option<ObjectId>,
        kind: ElementKind,
        name: impl Into<String>,
        metadata: SystemMetadata,
    ) -> Self {
        let now = crate::now();
        Self {
            id,
            parent_id,
            kind,
            name: name.into(),
            created: now,
            modified: now,
            opened: now,
            removed: false,
            metadata,
            custom_metadata: BTreeMap::new(),
        }
    }

    /// A fresh root directory.
    pub fn root() -> Self {
        Self::new(
            ObjectId::generate(),
            None,
            ElementKind::Directory,
            ROOT_NAME,
            SystemMetadata::default(),
        )
    }

    pub fn directory(parent_id: ObjectId, name: impl Into<String>) -> Self {
        Self::new(
            ObjectId::generate(),
            Some(parent_id),
            ElementKind::Directory,
            name,
            SystemMetadata::default(),
        )
    }

    /// A file element whose content lives in the chunk map `id`.
    pub fn file(id: ObjectId, parent_id: ObjectId, name: impl Into<String>, length: u64) -> Self {
        Self::new(
            id,
            Some(parent_id),
            ElementKind::File,
            name,
            SystemMetadata::with_length(length),
        )
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_directory(&self) -> bool {
        self.kind == ElementKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == ElementKind::File
    }

    /// Live (not soft-deleted) directory.
    pub fn is_live_directory(&self) -> bool {
        self.is_directory() && !self.removed
    }

    pub fn length(&self) -> u64 {
        self.metadata.length.unwrap_or(0)
    }
}
