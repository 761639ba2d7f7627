use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use docfs_lock::{keys, LockGuard, NamedLockManager};
use docfs_store::{DocumentStore, Filter, Transaction, Update};
use docfs_types::{now, Element, ElementKind, MetadataValue, ObjectId};
use tracing::{debug, info, warn};

use crate::error::{TreeError, TreeResult};
use crate::naming;

fn custom_metadata(e: &mut Element) -> &mut BTreeMap<String, MetadataValue> {
    &mut e.custom_metadata
}

/// Shared access to the element collection.
///
/// Holds the operations common to directories and files: lookups, sibling
/// name allocation, timestamp touches, soft delete with path capture and
/// restore by path replay.
pub struct Elements<S> {
    store: Arc<S>,
    locks: NamedLockManager,
    root_id: ObjectId,
}

impl<S> Clone for Elements<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: self.locks.clone(),
            root_id: self.root_id.clone(),
        }
    }
}

impl<S: DocumentStore> Elements<S> {
    /// Bind to `store`, creating the root directory if there is none yet.
    pub async fn open(store: Arc<S>, locks: NamedLockManager) -> TreeResult<Self> {
        let root_id = {
            let _guard = locks.acquire_writer(keys::root()).await;
            let existing = store
                .find_one(&Filter::new(|e: &Element| e.parent_id.is_none()))
                .await?;
            match existing {
                Some(root) => root.id,
                None => {
                    let root = Element::root();
                    store.insert_one(&root).await?;
                    info!(id = %root.id, "root directory created");
                    root.id
                }
            }
        };
        Ok(Self {
            store,
            locks,
            root_id,
        })
    }

    pub fn root_id(&self) -> &ObjectId {
        &self.root_id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn locks(&self) -> &NamedLockManager {
        &self.locks
    }

    pub fn is_root(&self, id: &ObjectId) -> bool {
        id == &self.root_id
    }

    pub(crate) fn ensure_not_root(&self, id: &ObjectId, op: &str) -> TreeResult<()> {
        if self.is_root(id) {
            return Err(TreeError::invalid(format!("cannot {op} the root directory")));
        }
        Ok(())
    }

    pub(crate) async fn lock_element(&self, id: &ObjectId) -> LockGuard {
        self.locks.acquire_writer(keys::element(id)).await
    }

    pub(crate) async fn lock_children(&self, parent_id: &ObjectId) -> LockGuard {
        self.locks.acquire_writer(keys::children(parent_id)).await
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub async fn fetch(&self, id: &ObjectId) -> TreeResult<Option<Element>> {
        Ok(self.store.find_one::<Element>(&Filter::by_id(id)).await?)
    }

    /// The element `id`, removed or not.
    pub async fn require(&self, id: &ObjectId) -> TreeResult<Element> {
        self.fetch(id)
            .await?
            .ok_or_else(|| TreeError::NotFound(id.clone()))
    }

    /// The element `id` if it is not soft-deleted.
    pub async fn require_live(&self, id: &ObjectId) -> TreeResult<Element> {
        match self.fetch(id).await? {
            Some(e) if !e.removed => Ok(e),
            _ => Err(TreeError::NotFound(id.clone())),
        }
    }

    /// A live element of the given kind.
    pub async fn require_kind(&self, id: &ObjectId, kind: ElementKind) -> TreeResult<Element> {
        let element = self.require_live(id).await?;
        ensure_kind(&element, kind)?;
        Ok(element)
    }

    pub async fn require_directory(&self, id: &ObjectId) -> TreeResult<Element> {
        self.require_kind(id, ElementKind::Directory).await
    }

    /// Every child of `parent_id`, including soft-deleted ones.
    pub async fn children(&self, parent_id: &ObjectId) -> TreeResult<Vec<Element>> {
        let parent = parent_id.clone();
        Ok(self
            .store
            .find(&Filter::new(move |e: &Element| {
                e.parent_id.as_ref() == Some(&parent)
            }))
            .await?)
    }

    pub async fn live_children(&self, parent_id: &ObjectId) -> TreeResult<Vec<Element>> {
        let mut children = self.children(parent_id).await?;
        children.retain(|e| !e.removed);
        Ok(children)
    }

    /// Names of live children of `parent_id`, ignoring `excluding`.
    pub async fn taken_names(
        &self,
        parent_id: &ObjectId,
        excluding: Option<&ObjectId>,
    ) -> TreeResult<HashSet<String>> {
        Ok(self
            .live_children(parent_id)
            .await?
            .into_iter()
            .filter(|e| Some(&e.id) != excluding)
            .map(|e| e.name)
            .collect())
    }

    /// Live child of `parent_id` named `name`, other than `excluding`.
    pub async fn live_child_named(
        &self,
        parent_id: &ObjectId,
        name: &str,
        excluding: &ObjectId,
    ) -> TreeResult<Option<Element>> {
        Ok(self
            .live_children(parent_id)
            .await?
            .into_iter()
            .find(|e| e.name == name && &e.id != excluding))
    }

    /// Whether `id` is `ancestor` or lies somewhere beneath it.
    pub async fn is_within(&self, ancestor: &ObjectId, id: &ObjectId) -> TreeResult<bool> {
        let mut seen = HashSet::new();
        let mut current = id.clone();
        loop {
            if &current == ancestor {
                return Ok(true);
            }
            if !seen.insert(current.clone()) {
                warn!(id = %current, "cycle in parent chain");
                return Ok(false);
            }
            match self.fetch(&current).await?.and_then(|e| e.parent_id) {
                Some(parent) => current = parent,
                None => return Ok(false),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timestamps
    // -----------------------------------------------------------------------

    /// Set `opened` to now and return the updated element.
    pub async fn touch_opened(&self, id: &ObjectId) -> TreeResult<Element> {
        let at = now();
        self.store
            .find_one_and_update(
                &Filter::by_id(id),
                &Update::set(move |e: &mut Element| e.opened = at),
            )
            .await?
            .ok_or_else(|| TreeError::NotFound(id.clone()))
    }

    /// Set `opened` and `modified` to now. Missing elements are ignored.
    pub async fn touch(&self, id: &ObjectId) -> TreeResult<()> {
        let at = now();
        self.store
            .update_one(
                &Filter::by_id(id),
                &Update::set(move |e: &mut Element| {
                    e.opened = at;
                    e.modified = at;
                }),
            )
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Naming and placement
    // -----------------------------------------------------------------------

    /// Insert `element` under its parent, renaming it on collision.
    pub async fn insert_named(&self, element: Element) -> TreeResult<Element> {
        self.insert_named_with(element, Transaction::new()).await
    }

    /// As [`insert_named`](Self::insert_named), committing the operations
    /// staged in `tx` in the same transaction as the insert.
    pub async fn insert_named_with(
        &self,
        mut element: Element,
        mut tx: Transaction,
    ) -> TreeResult<Element> {
        naming::validate(&element.name)?;
        let parent_id = element
            .parent_id
            .clone()
            .ok_or_else(|| TreeError::invalid("element has no parent"))?;
        {
            let _guard = self.lock_children(&parent_id).await;
            self.require_directory(&parent_id).await?;
            let taken = self.taken_names(&parent_id, None).await?;
            element.name = naming::dedup(&element.name, element.kind, &taken);
            tx.insert(&element)?;
            self.store.commit(tx).await?;
        }
        self.touch(&parent_id).await?;
        debug!(id = %element.id, parent = %parent_id, name = %element.name, kind = %element.kind, "element created");
        Ok(element)
    }

    /// Move `element` under `new_parent_id`, renaming it on collision. The
    /// caller holds the element's lock.
    pub async fn reparent(&self, element: &Element, new_parent_id: &ObjectId) -> TreeResult<Element> {
        let moved = {
            let _guard = self.lock_children(new_parent_id).await;
            self.require_directory(new_parent_id).await?;
            let taken = self.taken_names(new_parent_id, Some(&element.id)).await?;
            let name = naming::dedup(&element.name, element.kind, &taken);
            let parent = new_parent_id.clone();
            let at = now();
            self.store
                .find_one_and_update(
                    &Filter::by_id(&element.id),
                    &Update::set(move |e: &mut Element| {
                        e.parent_id = Some(parent.clone());
                        e.name = name.clone();
                        e.opened = at;
                        e.modified = at;
                    }),
                )
                .await?
                .ok_or_else(|| TreeError::NotFound(element.id.clone()))?
        };
        if let Some(old_parent) = &element.parent_id {
            self.touch(old_parent).await?;
        }
        self.touch(new_parent_id).await?;
        debug!(id = %moved.id, parent = %new_parent_id, name = %moved.name, "element moved");
        Ok(moved)
    }

    pub async fn rename(
        &self,
        id: &ObjectId,
        new_name: &str,
        kind: ElementKind,
    ) -> TreeResult<Element> {
        self.ensure_not_root(id, "rename")?;
        naming::validate(new_name)?;
        let _guard = self.lock_element(id).await;
        let element = self.require_kind(id, kind).await?;
        let parent_id = element
            .parent_id
            .clone()
            .ok_or_else(|| TreeError::invalid("element has no parent"))?;

        let _children = self.lock_children(&parent_id).await;
        let taken = self.taken_names(&parent_id, Some(id)).await?;
        let name = naming::dedup(new_name, kind, &taken);
        let at = now();
        let renamed = self
            .store
            .find_one_and_update(
                &Filter::by_id(id),
                &Update::set(move |e: &mut Element| {
                    e.name = name.clone();
                    e.modified = at;
                    e.opened = at;
                }),
            )
            .await?
            .ok_or_else(|| TreeError::NotFound(id.clone()))?;
        debug!(id = %id, name = %renamed.name, "element renamed");
        Ok(renamed)
    }

    // -----------------------------------------------------------------------
    // Custom metadata
    // -----------------------------------------------------------------------

    pub async fn set_custom_metadata(
        &self,
        id: &ObjectId,
        kind: ElementKind,
        key: &str,
        value: MetadataValue,
    ) -> TreeResult<Element> {
        self.ensure_not_root(id, "modify")?;
        if key.is_empty() {
            return Err(TreeError::InvalidName(key.to_string()));
        }
        let _guard = self.lock_element(id).await;
        self.require_kind(id, kind).await?;
        let key = key.to_string();
        let at = now();
        self.store
            .find_one_and_update(
                &Filter::by_id(id),
                &Update::set(move |e: &mut Element| {
                    e.custom_metadata.insert(key.clone(), value.clone());
                    e.modified = at;
                }),
            )
            .await?
            .ok_or_else(|| TreeError::NotFound(id.clone()))
    }

    pub async fn remove_custom_metadata(
        &self,
        id: &ObjectId,
        kind: ElementKind,
        key: &str,
    ) -> TreeResult<Element> {
        self.ensure_not_root(id, "modify")?;
        let _guard = self.lock_element(id).await;
        self.require_kind(id, kind).await?;
        let key = key.to_string();
        let at = now();
        let update = Update::<Element>::pull(custom_metadata, move |k: &String, _: &MetadataValue| {
            *k == key
        })
        .and(move |e: &mut Element| e.modified = at);
        self.store
            .find_one_and_update(&Filter::by_id(id), &update)
            .await?
            .ok_or_else(|| TreeError::NotFound(id.clone()))
    }

    // -----------------------------------------------------------------------
    // Soft delete and restore
    // -----------------------------------------------------------------------

    /// Names and ids of every ancestor of `element`, root first, each
    /// followed by a separator.
    pub async fn capture_path(&self, element: &Element) -> TreeResult<(String, String)> {
        let mut chain = Vec::new();
        let mut next = element.parent_id.clone();
        while let Some(id) = next {
            if chain.iter().any(|e: &Element| e.id == id) {
                return Err(TreeError::invalid(format!("cycle in parent chain at {id}")));
            }
            let ancestor = self.require(&id).await?;
            next = ancestor.parent_id.clone();
            chain.push(ancestor);
        }
        chain.reverse();
        let sep = naming::SEPARATOR;
        let names: String = chain.iter().map(|e| format!("{}{sep}", e.name)).collect();
        let ids: String = chain.iter().map(|e| format!("{}{sep}", e.id)).collect();
        Ok((names, ids))
    }

    /// Tombstone `id`, recording where it lived. Absent or already removed
    /// elements are left alone.
    pub async fn soft_remove(&self, id: &ObjectId, kind: ElementKind) -> TreeResult<()> {
        self.ensure_not_root(id, "remove")?;
        let _guard = self.lock_element(id).await;
        let element = match self.fetch(id).await? {
            Some(e) if !e.removed => e,
            _ => return Ok(()),
        };
        ensure_kind(&element, kind)?;

        let (path_names, path_ids) = self.capture_path(&element).await?;
        let at = now();
        self.store
            .update_one(
                &Filter::by_id(id),
                &Update::set(move |e: &mut Element| {
                    e.removed = true;
                    e.metadata.path_names = Some(path_names.clone());
                    e.metadata.path_ids = Some(path_ids.clone());
                    e.metadata.deleted = Some(at);
                }),
            )
            .await?;
        if let Some(parent) = &element.parent_id {
            self.touch(parent).await?;
        }
        debug!(id = %id, kind = %kind, "element soft-deleted");
        Ok(())
    }

    /// Bring a soft-deleted element back to the place it was removed from.
    ///
    /// The recorded ancestor chain is replayed from the root. Each segment
    /// reuses the live directory with the recorded id, else a live directory
    /// with the recorded name under the previous segment, else a newly
    /// created directory. If the final slot is taken the element gets a
    /// `_restored_<timestamp>` name.
    pub async fn restore(&self, id: &ObjectId, kind: ElementKind) -> TreeResult<Element> {
        self.ensure_not_root(id, "restore")?;
        let _guard = self.lock_element(id).await;
        let element = self.require(id).await?;
        ensure_kind(&element, kind)?;
        let (Some(path_names), Some(path_ids)) = (
            element.metadata.path_names.clone(),
            element.metadata.path_ids.clone(),
        ) else {
            return Err(TreeError::NotFound(id.clone()));
        };
        if !element.removed {
            return Err(TreeError::NotFound(id.clone()));
        }

        let names: Vec<&str> = split_path(&path_names);
        let ids: Vec<&str> = split_path(&path_ids);
        if names.len() != ids.len() || names.is_empty() {
            return Err(TreeError::invalid(format!(
                "corrupt deletion path on {id}"
            )));
        }

        let mut current = self.root_id.clone();
        for (segment_id, segment_name) in ids.iter().zip(names.iter()).skip(1) {
            current = self.replay_segment(&current, segment_id, segment_name).await?;
        }

        let restored = {
            let _children = self.lock_children(&current).await;
            let taken = self.taken_names(&current, Some(id)).await?;
            let name = naming::restored_name(&element.name, now(), &taken);
            let parent = current.clone();
            let at = now();
            self.store
                .find_one_and_update(
                    &Filter::by_id(id),
                    &Update::set(move |e: &mut Element| {
                        e.parent_id = Some(parent.clone());
                        e.name = name.clone();
                        e.removed = false;
                        e.metadata.clear_deletion();
                        e.opened = at;
                        e.modified = at;
                    }),
                )
                .await?
                .ok_or_else(|| TreeError::NotFound(id.clone()))?
        };
        self.touch(&current).await?;
        debug!(id = %id, parent = %current, name = %restored.name, "element restored");
        Ok(restored)
    }

    async fn replay_segment(
        &self,
        parent_id: &ObjectId,
        segment_id: &str,
        segment_name: &str,
    ) -> TreeResult<ObjectId> {
        if let Ok(recorded) = ObjectId::parse(segment_id) {
            if let Some(existing) = self.fetch(&recorded).await? {
                if existing.is_live_directory() {
                    return Ok(existing.id);
                }
            }
        }
        let by_name = self
            .live_children(parent_id)
            .await?
            .into_iter()
            .find(|e| e.is_directory() && e.name == segment_name);
        if let Some(existing) = by_name {
            return Ok(existing.id);
        }
        let created = self
            .insert_named(Element::directory(parent_id.clone(), segment_name))
            .await?;
        debug!(id = %created.id, name = %created.name, "directory recreated during restore");
        Ok(created.id)
    }
}

pub(crate) fn ensure_kind(element: &Element, kind: ElementKind) -> TreeResult<()> {
    if element.kind != kind {
        return Err(TreeError::invalid(format!(
            "{} is a {}, not a {kind}",
            element.id, element.kind
        )));
    }
    Ok(())
}

fn split_path(path: &str) -> Vec<&str> {
    path.split(naming::SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect()
}
