use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use docfs_types::{Element, Group, ObjectId, User};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record type stored in one collection.
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the collection holding records of this type.
    const COLLECTION: &'static str;

    fn id(&self) -> &ObjectId;
}

impl Document for Element {
    const COLLECTION: &'static str = "elements";

    fn id(&self) -> &ObjectId {
        &self.id
    }
}

impl Document for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &ObjectId {
        &self.id
    }
}

impl Document for Group {
    const COLLECTION: &'static str = "groups";

    fn id(&self) -> &ObjectId {
        &self.id
    }
}

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Selects records of type `T`.
///
/// A filter pinned to an id lets backends do a point lookup instead of a
/// scan; any additional predicate is still checked against the record.
pub struct Filter<T> {
    id: Option<ObjectId>,
    predicate: Option<Predicate<T>>,
}

impl<T: Document> Filter<T> {
    /// Matches every record.
    pub fn all() -> Self {
        Self {
            id: None,
            predicate: None,
        }
    }

    /// Matches the record with this id.
    pub fn by_id(id: &ObjectId) -> Self {
        Self {
            id: Some(id.clone()),
            predicate: None,
        }
    }

    /// Matches records satisfying `predicate`.
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            id: None,
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Narrow the filter with another predicate.
    pub fn and(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        let combined: Predicate<T> = match self.predicate {
            Some(existing) => Arc::new(move |doc: &T| existing(doc) && predicate(doc)),
            None => Arc::new(predicate),
        };
        Self {
            id: self.id,
            predicate: Some(combined),
        }
    }

    pub fn pinned_id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    pub fn matches(&self, doc: &T) -> bool {
        if let Some(id) = &self.id {
            if doc.id() != id {
                return false;
            }
        }
        self.predicate.as_ref().map_or(true, |p| p(doc))
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.id)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

type Mutation<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// An ordered list of field mutations applied to a matched record.
pub struct Update<T> {
    ops: Vec<Mutation<T>>,
}

impl<T: Document> Update<T> {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Single mutation, e.g. `Update::set(|e: &mut Element| e.removed = true)`.
    pub fn set(op: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        Self::new().and(op)
    }

    /// Append another mutation.
    pub fn and(mut self, op: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.ops.push(Arc::new(op));
        self
    }

    /// Append every mutation of `other`.
    pub fn combine(mut self, other: Update<T>) -> Self {
        self.ops.extend(other.ops);
        self
    }

    /// Remove the entries of a map-valued field that match `predicate`.
    pub fn pull<K, V>(
        field: fn(&mut T) -> &mut BTreeMap<K, V>,
        predicate: impl Fn(&K, &V) -> bool + Send + Sync + 'static,
    ) -> Self
    where
        K: Ord + 'static,
        V: 'static,
    {
        Self::set(move |doc: &mut T| field(doc).retain(|k, v| !predicate(k, &*v)))
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn apply(&self, doc: &mut T) {
        for op in &self.ops {
            op(doc);
        }
    }
}

impl<T: Document> Default for Update<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Update<T> {
    fn clone(&self) -> Self {
        Self {
            ops: self.ops.clone(),
        }
    }
}

impl<T> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update").field("ops", &self.ops.len()).finish()
    }
}
