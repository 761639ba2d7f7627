//! Predicate search over a subtree.
//!
//! A query either pins an exact id or parent id, in which case every other
//! condition is ignored, or carries a list of `(field, condition)` pairs that
//! must all hold. Search visits the children of the search root and recurses
//! into every live subdirectory.

use std::cmp::Ordering;
use std::collections::VecDeque;

use docfs_store::DocumentStore;
use docfs_types::{Element, MetadataKey, MetadataValue, ObjectId};

use crate::elements::Elements;
use crate::error::TreeResult;

/// Comparison applied to one field.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(MetadataValue),
    Ne(MetadataValue),
    Lt(MetadataValue),
    Lte(MetadataValue),
    Gt(MetadataValue),
    Gte(MetadataValue),
    /// Substring match, honoured on [`Field::Name`] only.
    Contains(String),
}

impl Condition {
    /// Evaluate against a field value. A missing value satisfies `Ne` and
    /// nothing else.
    pub fn test(&self, value: Option<&MetadataValue>) -> bool {
        let Some(value) = value else {
            return matches!(self, Condition::Ne(_));
        };
        match self {
            Condition::Eq(v) => value.compare(v) == Some(Ordering::Equal),
            Condition::Ne(v) => value.compare(v) != Some(Ordering::Equal),
            Condition::Lt(v) => value.compare(v) == Some(Ordering::Less),
            Condition::Lte(v) => matches!(
                value.compare(v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::Gt(v) => value.compare(v) == Some(Ordering::Greater),
            Condition::Gte(v) => matches!(
                value.compare(v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::Contains(needle) => value
                .as_text()
                .is_some_and(|text| text.contains(needle.as_str())),
        }
    }
}

/// Element field a condition reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Name,
    Opened,
    Modified,
    Created,
    Removed,
    Metadata(MetadataKey),
    Custom(String),
}

impl Field {
    pub fn value(&self, element: &Element) -> Option<MetadataValue> {
        match self {
            Field::Name => Some(MetadataValue::from(element.name.as_str())),
            Field::Opened => Some(element.opened.into()),
            Field::Modified => Some(element.modified.into()),
            Field::Created => Some(element.created.into()),
            Field::Removed => Some(element.removed.into()),
            Field::Metadata(key) => element.metadata.get(*key),
            Field::Custom(key) => element.custom_metadata.get(key).cloned(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementQuery {
    pub id: Option<ObjectId>,
    pub parent_id: Option<ObjectId>,
    pub conditions: Vec<(Field, Condition)>,
}

impl ElementQuery {
    /// Matches every element.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: ObjectId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_parent(parent_id: ObjectId) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    pub fn with(mut self, field: Field, condition: Condition) -> Self {
        self.conditions.push((field, condition));
        self
    }

    pub fn name(self, condition: Condition) -> Self {
        self.with(Field::Name, condition)
    }

    pub fn opened(self, condition: Condition) -> Self {
        self.with(Field::Opened, condition)
    }

    pub fn modified(self, condition: Condition) -> Self {
        self.with(Field::Modified, condition)
    }

    pub fn created(self, condition: Condition) -> Self {
        self.with(Field::Created, condition)
    }

    pub fn removed(self, removed: bool) -> Self {
        self.with(Field::Removed, Condition::Eq(removed.into()))
    }

    pub fn metadata(self, key: MetadataKey, condition: Condition) -> Self {
        self.with(Field::Metadata(key), condition)
    }

    pub fn custom(self, key: impl Into<String>, condition: Condition) -> Self {
        self.with(Field::Custom(key.into()), condition)
    }

    /// Whether `element` satisfies every condition. Pinned ids are not
    /// consulted here.
    pub fn matches(&self, element: &Element) -> bool {
        self.conditions.iter().all(|(field, condition)| {
            if matches!(condition, Condition::Contains(_)) && *field != Field::Name {
                return false;
            }
            condition.test(field.value(element).as_ref())
        })
    }
}

/// Run `query` beneath `search_root`.
pub async fn find<S: DocumentStore>(
    elements: &Elements<S>,
    search_root: &ObjectId,
    query: &ElementQuery,
) -> TreeResult<Vec<Element>> {
    if let Some(id) = &query.id {
        return Ok(elements.fetch(id).await?.into_iter().collect());
    }
    if let Some(parent_id) = &query.parent_id {
        return elements.children(parent_id).await;
    }

    elements.require(search_root).await?;
    let mut found = Vec::new();
    let mut pending = VecDeque::from([search_root.clone()]);
    while let Some(directory) = pending.pop_front() {
        for child in elements.children(&directory).await? {
            if child.is_live_directory() {
                pending.push_back(child.id.clone());
            }
            if query.matches(&child) {
                found.push(child);
            }
        }
    }
    Ok(found)
}
