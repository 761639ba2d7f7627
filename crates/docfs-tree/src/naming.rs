//! Element name rules.
//!
//! Sibling names are unique among live elements. A colliding directory name
//! gets a numeric suffix (`x`, `x(0)`, `x(1)`); file names keep their
//! extension last (`a.txt`, `a(0).txt`). Copies of files use a `_Copy`
//! marker and restored elements a `_restored_<timestamp>` marker.

use std::collections::HashSet;

use docfs_types::{ElementKind, Timestamp};

use crate::error::{TreeError, TreeResult};

pub const SEPARATOR: char = '/';

pub fn validate(name: &str) -> TreeResult<()> {
    if name.is_empty() || name.contains(SEPARATOR) {
        return Err(TreeError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Split `name` at its last dot. A leading dot does not start an extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], Some(&name[i + 1..])),
        _ => (name, None),
    }
}

fn with_marker(name: &str, kind: ElementKind, marker: &str) -> String {
    match (kind, split_extension(name)) {
        (ElementKind::File, (stem, Some(ext))) => format!("{stem}{marker}.{ext}"),
        _ => format!("{name}{marker}"),
    }
}

/// First of `name`, `name(0)`, `name(1)`, … not in `taken`.
pub fn dedup(name: &str, kind: ElementKind, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    numbered(name, kind, taken)
}

fn numbered(name: &str, kind: ElementKind, taken: &HashSet<String>) -> String {
    (0u64..)
        .map(|n| with_marker(name, kind, &format!("({n})")))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Name for a file copy landing next to a same-named sibling:
/// `a_Copy.txt`, then `a_Copy(0).txt`, …
pub fn copy_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let copy = with_marker(name, ElementKind::File, "_Copy");
    if !taken.contains(&copy) {
        return copy;
    }
    (0u64..)
        .map(|n| with_marker(name, ElementKind::File, &format!("_Copy({n})")))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(copy)
}

/// Name for an element restored into a slot that is now occupied.
pub fn restored_name(name: &str, at: Timestamp, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let stamped = format!("{name}_restored_{}", at.format("%Y_%m_%d_%-H:%M:%S:%3f"));
    dedup(&stamped, ElementKind::Directory, taken)
}
