use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::Timestamp;

/// Typed value stored in element metadata.
///
/// Values of different variants never compare as ordered. `Int` and `Float`
/// are the one exception and compare numerically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Time(Timestamp),
    Bytes(Vec<u8>),
}

impl MetadataValue {
    /// Ordering between two values, `None` when the variants are unrelated.
    pub fn compare(&self, other: &MetadataValue) -> Option<Ordering> {
        use MetadataValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Bytes(a), Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{v}"),
            MetadataValue::Int(v) => write!(f, "{v}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Text(v) => f.write_str(v),
            MetadataValue::Time(v) => write!(f, "{}", v.to_rfc3339()),
            MetadataValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for MetadataValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Timestamp> for MetadataValue {
    fn from(v: Timestamp) -> Self {
        Self::Time(v)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Reserved system metadata keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataKey {
    /// Byte length of a file's content.
    Length,
    /// Slash-joined ancestor names captured at soft delete.
    PathNames,
    /// Slash-joined ancestor ids captured at soft delete.
    PathIds,
    /// Time of the soft delete.
    Deleted,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 4] = [
        MetadataKey::Length,
        MetadataKey::PathNames,
        MetadataKey::PathIds,
        MetadataKey::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKey::Length => "Length",
            MetadataKey::PathNames => "PathNames",
            MetadataKey::PathIds => "PathIDs",
            MetadataKey::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetadataKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownMetadataKey(s.to_string()))
    }
}

/// The closed set of reserved metadata carried by every element.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetadata {
    pub length: Option<u64>,
    pub path_names: Option<String>,
    pub path_ids: Option<String>,
    pub deleted: Option<Timestamp>,
}

impl SystemMetadata {
    /// Metadata for a file of the given length.
    pub fn with_length(length: u64) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }

    /// Value of a reserved key as a [`MetadataValue`], if set.
    pub fn get(&self, key: MetadataKey) -> Option<MetadataValue> {
        match key {
            MetadataKey::Length => self.length.map(MetadataValue::from),
            MetadataKey::PathNames => self.path_names.clone().map(MetadataValue::Text),
            MetadataKey::PathIds => self.path_ids.clone().map(MetadataValue::Text),
            MetadataKey::Deleted => self.deleted.map(MetadataValue::Time),
        }
    }

    /// Drop the keys written by a soft delete.
    pub fn clear_deletion(&mut self) {
        self.path_names = None;
        self.path_ids = None;
        self.deleted = None;
    }

    pub fn is_deletion_captured(&self) -> bool {
        self.path_names.is_some() && self.path_ids.is_some()
    }
}
