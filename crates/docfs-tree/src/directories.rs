use std::collections::VecDeque;

use docfs_store::{DocumentStore, Filter, Transaction, Update};
use docfs_types::{Element, ElementKind, MetadataValue, ObjectId};
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info};

use crate::elements::{ensure_kind, Elements};
use crate::error::{TreeError, TreeResult};
use crate::files::Files;
use crate::naming;
use crate::search::{self, ElementQuery};

/// Directory operations.
pub struct Directories<S> {
    elements: Elements<S>,
    files: Files<S>,
}

impl<S> Clone for Directories<S> {
    fn clone(&self) -> Self {
        Self {
            elements: self.elements.clone(),
            files: self.files.clone(),
        }
    }
}

impl<S: DocumentStore> Directories<S> {
    pub fn new(files: Files<S>) -> Self {
        Self {
            elements: files.elements().clone(),
            files,
        }
    }

    pub fn root_id(&self) -> &ObjectId {
        self.elements.root_id()
    }

    pub async fn root(&self) -> TreeResult<Element> {
        self.elements.require(self.elements.root_id()).await
    }

    pub async fn create(&self, parent_id: &ObjectId, name: &str) -> TreeResult<Element> {
        naming::validate(name)?;
        self.elements
            .insert_named(Element::directory(parent_id.clone(), name))
            .await
    }

    /// Insert a directory built by the caller under its parent, deduplicating
    /// its name and committing `tx` in the same transaction.
    pub async fn insert_with(&self, directory: Element, tx: Transaction) -> TreeResult<Element> {
        ensure_kind(&directory, ElementKind::Directory)?;
        self.elements.insert_named_with(directory, tx).await
    }

    /// The directory `id`, removed or not. Touches `opened`.
    pub async fn get(&self, id: &ObjectId) -> TreeResult<Element> {
        self.elements.ensure_not_root(id, "get")?;
        let element = self.elements.require(id).await?;
        ensure_kind(&element, ElementKind::Directory)?;
        self.elements.touch_opened(id).await
    }

    /// Live children of `id`.
    pub async fn list(&self, id: &ObjectId) -> TreeResult<Vec<Element>> {
        self.elements.require_directory(id).await?;
        let children = self.elements.live_children(id).await?;
        self.elements.touch_opened(id).await?;
        Ok(children)
    }

    /// Every live element beneath `id`, breadth first.
    pub async fn list_recursive(&self, id: &ObjectId) -> TreeResult<Vec<Element>> {
        self.elements.require_directory(id).await?;
        let mut out = Vec::new();
        let mut pending = VecDeque::from([id.clone()]);
        while let Some(directory) = pending.pop_front() {
            self.elements.touch_opened(&directory).await?;
            for child in self.elements.live_children(&directory).await? {
                if child.is_directory() {
                    pending.push_back(child.id.clone());
                }
                out.push(child);
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Move
    // -----------------------------------------------------------------------

    /// Move `id` under `new_parent_id`. When the destination already holds a
    /// live directory of the same name the two are merged and the returned
    /// element is the surviving one.
    pub async fn move_to(&self, id: &ObjectId, new_parent_id: &ObjectId) -> TreeResult<Element> {
        self.elements.ensure_not_root(id, "move")?;
        let _guard = self.elements.lock_element(id).await;
        self.move_locked(id, new_parent_id).await
    }

    fn move_locked<'a>(
        &'a self,
        id: &'a ObjectId,
        new_parent_id: &'a ObjectId,
    ) -> BoxFuture<'a, TreeResult<Element>> {
        async move {
            let element = self.elements.require_kind(id, ElementKind::Directory).await?;
            self.elements.require_directory(new_parent_id).await?;
            if self.elements.is_within(id, new_parent_id).await? {
                return Err(TreeError::invalid(format!(
                    "cannot move {id} into its own subtree"
                )));
            }
            if element.parent_id.as_ref() == Some(new_parent_id) {
                return self.elements.touch_opened(id).await;
            }

            let existing = {
                let _children = self.elements.lock_children(new_parent_id).await;
                self.elements
                    .live_child_named(new_parent_id, &element.name, id)
                    .await?
            };
            match existing {
                Some(target) if target.is_directory() => self.merge_into(&element, &target).await,
                _ => self.elements.reparent(&element, new_parent_id).await,
            }
        }
        .boxed()
    }

    /// Move every child of `source` into `target`, then drop `source`.
    async fn merge_into(&self, source: &Element, target: &Element) -> TreeResult<Element> {
        for child in self.elements.children(&source.id).await? {
            if child.removed {
                let parent = target.id.clone();
                self.elements
                    .store()
                    .update_one(
                        &Filter::by_id(&child.id),
                        &Update::set(move |e: &mut Element| e.parent_id = Some(parent.clone())),
                    )
                    .await?;
                continue;
            }
            match child.kind {
                ElementKind::Directory => {
                    let _guard = self.elements.lock_element(&child.id).await;
                    self.move_locked(&child.id, &target.id).await?;
                }
                ElementKind::File => {
                    self.files.move_to(&child.id, &target.id).await?;
                }
            }
        }

        self.elements
            .store()
            .delete_one::<Element>(&Filter::by_id(&source.id))
            .await?;
        if let Some(parent) = &source.parent_id {
            self.elements.touch(parent).await?;
        }
        self.elements.touch(&target.id).await?;
        debug!(source = %source.id, target = %target.id, "directories merged");
        self.elements.require(&target.id).await
    }

    // -----------------------------------------------------------------------
    // Copy
    // -----------------------------------------------------------------------

    /// Copy the subtree at `id` under `new_parent_id`, merging into a live
    /// directory of the same name. Returns every created or merged element.
    pub async fn copy(&self, id: &ObjectId, new_parent_id: &ObjectId) -> TreeResult<Vec<Element>> {
        self.elements.ensure_not_root(id, "copy")?;
        let source = self.elements.require_kind(id, ElementKind::Directory).await?;
        self.elements.require_directory(new_parent_id).await?;
        if self.elements.is_within(id, new_parent_id).await? {
            return Err(TreeError::invalid(format!(
                "cannot copy {id} into its own subtree"
            )));
        }
        let mut out = Vec::new();
        self.copy_into(source, new_parent_id.clone(), &mut out).await?;
        info!(source = %id, elements = out.len(), "directory copied");
        Ok(out)
    }

    fn copy_into<'a>(
        &'a self,
        source: Element,
        dest: ObjectId,
        out: &'a mut Vec<Element>,
    ) -> BoxFuture<'a, TreeResult<()>> {
        async move {
            let target = {
                let _children = self.elements.lock_children(&dest).await;
                self.elements.require_directory(&dest).await?;
                match self
                    .elements
                    .live_child_named(&dest, &source.name, &source.id)
                    .await?
                {
                    Some(existing) if existing.is_directory() => existing,
                    _ => {
                        let taken = self.elements.taken_names(&dest, None).await?;
                        let name = naming::dedup(&source.name, ElementKind::Directory, &taken);
                        let mut copy = Element::directory(dest.clone(), name);
                        copy.metadata = source.metadata.clone();
                        copy.metadata.clear_deletion();
                        copy.custom_metadata = source.custom_metadata.clone();
                        self.elements.store().insert_one(&copy).await?;
                        copy
                    }
                }
            };
            self.elements.touch(&dest).await?;
            self.elements.touch_opened(&source.id).await?;
            out.push(target.clone());

            for child in self.elements.live_children(&source.id).await? {
                match child.kind {
                    ElementKind::Directory => {
                        self.copy_into(child, target.id.clone(), out).await?;
                    }
                    ElementKind::File => {
                        out.push(self.files.copy(&child.id, &target.id).await?);
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Soft delete `id`, or with `permanently` delete its whole subtree.
    /// Element records and file tombstones commit together; the file
    /// contents are left for collection.
    pub async fn remove(&self, id: &ObjectId, permanently: bool) -> TreeResult<()> {
        self.elements.ensure_not_root(id, "remove")?;
        if !permanently {
            return self
                .elements
                .soft_remove(id, ElementKind::Directory)
                .await;
        }

        let _guard = self.elements.lock_element(id).await;
        let Some(element) = self.elements.fetch(id).await? else {
            return Ok(());
        };
        ensure_kind(&element, ElementKind::Directory)?;

        let mut doomed = vec![element.clone()];
        let mut pending = VecDeque::from([id.clone()]);
        while let Some(directory) = pending.pop_front() {
            for child in self.elements.children(&directory).await? {
                if child.is_directory() {
                    pending.push_back(child.id.clone());
                }
                doomed.push(child);
            }
        }

        let mut tx = Transaction::new();
        for e in &doomed {
            tx.delete::<Element>(&e.id);
        }
        let file_ids: Vec<ObjectId> = doomed
            .iter()
            .filter(|e| e.is_file())
            .map(|e| e.id.clone())
            .collect();
        self.files.chunks().remove_many(&file_ids, tx).await?;

        if let Some(parent) = &element.parent_id {
            self.elements.touch(parent).await?;
        }
        info!(id = %id, elements = doomed.len(), "directory deleted");
        Ok(())
    }

    pub async fn restore(&self, id: &ObjectId) -> TreeResult<Element> {
        self.elements.restore(id, ElementKind::Directory).await
    }

    // -----------------------------------------------------------------------
    // Naming and metadata
    // -----------------------------------------------------------------------

    pub async fn rename(&self, id: &ObjectId, new_name: &str) -> TreeResult<Element> {
        self.elements
            .rename(id, new_name, ElementKind::Directory)
            .await
    }

    pub async fn set_custom_metadata(
        &self,
        id: &ObjectId,
        key: &str,
        value: impl Into<MetadataValue>,
    ) -> TreeResult<Element> {
        self.elements
            .set_custom_metadata(id, ElementKind::Directory, key, value.into())
            .await
    }

    pub async fn remove_custom_metadata(&self, id: &ObjectId, key: &str) -> TreeResult<Element> {
        self.elements
            .remove_custom_metadata(id, ElementKind::Directory, key)
            .await
    }

    pub async fn find(
        &self,
        search_root: &ObjectId,
        query: &ElementQuery,
    ) -> TreeResult<Vec<Element>> {
        search::find(&self.elements, search_root, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::search::Condition;
    use crate::testing::fixture;

    async fn names(dirs: &Directories<docfs_store::MemoryStore>, id: &ObjectId) -> Vec<String> {
        let mut names: Vec<String> = dirs
            .list(id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        names
    }

    // -----------------------------------------------------------------------
    // Create, get, list
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn colliding_names_get_numeric_suffixes() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        for _ in 0..3 {
            fx.dirs.create(&root, "x").await.unwrap();
        }
        assert_eq!(names(&fx.dirs, &root).await, ["x", "x(0)", "x(1)"]);
    }

    #[tokio::test]
    async fn insert_with_commits_staged_ops_or_nothing() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let taken = Element::directory(root.clone(), "taken");
        fx.store.insert_one(&taken).await.unwrap();

        let mut tx = Transaction::new();
        tx.insert(&taken).unwrap();
        let home = Element::directory(root.clone(), "home");
        assert!(fx.dirs.insert_with(home.clone(), tx).await.is_err());
        assert_eq!(names(&fx.dirs, &root).await, ["taken"]);

        let mut tx = Transaction::new();
        tx.update(&taken.id, Update::set(|e: &mut Element| e.name = "renamed".into()));
        let inserted = fx.dirs.insert_with(home.clone(), tx).await.unwrap();
        assert_eq!(inserted.id, home.id);
        assert_eq!(inserted.name, "home");
        assert_eq!(names(&fx.dirs, &root).await, ["home", "renamed"]);
    }

    #[tokio::test]
    async fn create_validates_name_and_parent() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let err = fx.dirs.create(&root, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
        let err = fx.dirs.create(&root, "a/b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
        let err = fx.dirs.create(&ObjectId::generate(), "a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let file = fx.files.create(&root, "f.txt", b"x").await.unwrap();
        let err = fx.dirs.create(&file.id, "a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[tokio::test]
    async fn root_is_exempt_from_mutation() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let dest = fx.dirs.create(&root, "d").await.unwrap();
        for err in [
            fx.dirs.get(&root).await.unwrap_err(),
            fx.dirs.rename(&root, "r").await.unwrap_err(),
            fx.dirs.move_to(&root, &dest.id).await.unwrap_err(),
            fx.dirs.remove(&root, false).await.unwrap_err(),
            fx.dirs.remove(&root, true).await.unwrap_err(),
            fx.dirs.restore(&root).await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        }
        assert!(fx.dirs.root().await.unwrap().is_root());
    }

    #[tokio::test]
    async fn get_touches_opened_and_rejects_files() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let dir = fx.dirs.create(&root, "d").await.unwrap();
        let got = fx.dirs.get(&dir.id).await.unwrap();
        assert!(got.opened >= dir.opened);

        let file = fx.files.create(&root, "f", b"").await.unwrap();
        let err = fx.dirs.get(&file.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[tokio::test]
    async fn list_skips_removed_children() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        fx.dirs.create(&a.id, "keep").await.unwrap();
        let gone = fx.dirs.create(&a.id, "gone").await.unwrap();
        fx.files.create(&a.id, "f.txt", b"1").await.unwrap();
        fx.dirs.remove(&gone.id, false).await.unwrap();

        assert_eq!(names(&fx.dirs, &a.id).await, ["f.txt", "keep"]);
        let all = fx.dirs.list_recursive(&root).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    // -----------------------------------------------------------------------
    // Move
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn move_into_own_subtree_is_rejected() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let b = fx.dirs.create(&a.id, "b").await.unwrap();
        let c = fx.dirs.create(&b.id, "c").await.unwrap();

        for target in [&a.id, &b.id, &c.id] {
            let err = fx.dirs.move_to(&a.id, target).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        }
        assert_eq!(fx.locks.live_locks(), 0);
    }

    #[tokio::test]
    async fn move_reparents_and_dedups_against_files() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let x = fx.dirs.create(&a.id, "x").await.unwrap();
        fx.files.create(&root, "x", b"file").await.unwrap();

        let moved = fx.dirs.move_to(&x.id, &root).await.unwrap();
        assert_eq!(moved.id, x.id);
        assert_eq!(moved.parent_id.as_ref(), Some(&root));
        assert_eq!(moved.name, "x(0)");
        assert!(names(&fx.dirs, &a.id).await.is_empty());
    }

    #[tokio::test]
    async fn move_merges_into_same_named_directory() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let b = fx.dirs.create(&root, "b").await.unwrap();
        let src = fx.dirs.create(&a.id, "x").await.unwrap();
        let dst = fx.dirs.create(&b.id, "x").await.unwrap();

        fx.files.create(&src.id, "f.txt", b"src").await.unwrap();
        let src_sub = fx.dirs.create(&src.id, "sub").await.unwrap();
        fx.files.create(&src_sub.id, "g", b"g").await.unwrap();
        let removed = fx.dirs.create(&src.id, "old").await.unwrap();
        fx.dirs.remove(&removed.id, false).await.unwrap();

        fx.files.create(&dst.id, "f.txt", b"dst").await.unwrap();
        let dst_sub = fx.dirs.create(&dst.id, "sub").await.unwrap();

        let merged = fx.dirs.move_to(&src.id, &b.id).await.unwrap();
        assert_eq!(merged.id, dst.id);
        assert!(fx.dirs.elements.fetch(&src.id).await.unwrap().is_none());
        assert!(fx.dirs.elements.fetch(&src_sub.id).await.unwrap().is_none());
        assert_eq!(names(&fx.dirs, &dst.id).await, ["f(0).txt", "f.txt", "sub"]);
        assert_eq!(names(&fx.dirs, &dst_sub.id).await, ["g"]);

        let old = fx.dirs.get(&removed.id).await.unwrap();
        assert!(old.removed);
        assert_eq!(old.parent_id.as_ref(), Some(&dst.id));
        assert_eq!(fx.locks.live_locks(), 0);
    }

    // -----------------------------------------------------------------------
    // Copy
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn copy_clones_subtree_with_content() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let b = fx.dirs.create(&root, "b").await.unwrap();
        fx.dirs.set_custom_metadata(&a.id, "tag", "red").await.unwrap();
        let f = fx.files.create(&a.id, "f.txt", b"content").await.unwrap();
        let sub = fx.dirs.create(&a.id, "sub").await.unwrap();
        fx.files.create(&sub.id, "g", b"0123456789abcdef").await.unwrap();

        let created = fx.dirs.copy(&a.id, &b.id).await.unwrap();
        assert_eq!(created.len(), 4);
        let copy = &created[0];
        assert_ne!(copy.id, a.id);
        assert_eq!(copy.name, "a");
        assert_eq!(copy.custom_metadata.get("tag"), Some(&MetadataValue::from("red")));

        let copied_file = created
            .iter()
            .find(|e| e.is_file() && e.name == "f.txt")
            .unwrap();
        assert_ne!(copied_file.id, f.id);
        let (bytes, _) = fx.files.download(&copied_file.id).await.unwrap();
        assert_eq!(bytes, b"content");

        fx.files.write(&f.id, b"changed").await.unwrap();
        let (bytes, _) = fx.files.download(&copied_file.id).await.unwrap();
        assert_eq!(bytes, b"content");
    }

    #[tokio::test]
    async fn copy_merges_into_existing_directory() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let src = fx.dirs.create(&a.id, "x").await.unwrap();
        let dst = fx.dirs.create(&root, "x").await.unwrap();
        fx.files.create(&src.id, "f", b"1").await.unwrap();

        let created = fx.dirs.copy(&src.id, &root).await.unwrap();
        assert_eq!(created[0].id, dst.id);
        assert_eq!(names(&fx.dirs, &dst.id).await, ["f"]);
        assert_eq!(names(&fx.dirs, &src.id).await, ["f"]);

        fx.files.create(&dst.id, "g", b"2").await.unwrap();
        fx.files.create(&src.id, "g", b"3").await.unwrap();
        fx.dirs.copy(&src.id, &root).await.unwrap();
        assert_eq!(names(&fx.dirs, &dst.id).await, ["f", "f_Copy", "g", "g_Copy"]);
    }

    #[tokio::test]
    async fn copy_next_to_itself_gets_new_name() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let created = fx.dirs.copy(&a.id, &root).await.unwrap();
        assert_eq!(created[0].name, "a(0)");
    }

    #[tokio::test]
    async fn copy_into_own_subtree_is_rejected() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let b = fx.dirs.create(&a.id, "b").await.unwrap();
        let err = fx.dirs.copy(&a.id, &b.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let err = fx.dirs.copy(&a.id, &a.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    // -----------------------------------------------------------------------
    // Rename and metadata
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn rename_dedups_against_siblings() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        fx.dirs.create(&root, "taken").await.unwrap();
        let d = fx.dirs.create(&root, "d").await.unwrap();
        let renamed = fx.dirs.rename(&d.id, "taken").await.unwrap();
        assert_eq!(renamed.name, "taken(0)");
        let renamed = fx.dirs.rename(&d.id, "taken(0)").await.unwrap();
        assert_eq!(renamed.name, "taken(0)");
    }

    #[tokio::test]
    async fn custom_metadata_set_and_remove() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let d = fx.dirs.create(&root, "d").await.unwrap();
        let e = fx.dirs.set_custom_metadata(&d.id, "stars", 5i64).await.unwrap();
        assert_eq!(e.custom_metadata.get("stars"), Some(&MetadataValue::Int(5)));
        let e = fx.dirs.remove_custom_metadata(&d.id, "stars").await.unwrap();
        assert!(e.custom_metadata.is_empty());
        let err = fx.dirs.set_custom_metadata(&d.id, "", 1i64).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
    }

    // -----------------------------------------------------------------------
    // Remove and restore
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn soft_remove_captures_path_and_is_idempotent() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let b = fx.dirs.create(&a.id, "b").await.unwrap();

        fx.dirs.remove(&b.id, false).await.unwrap();
        let removed = fx.dirs.get(&b.id).await.unwrap();
        assert!(removed.removed);
        assert_eq!(removed.metadata.path_names.as_deref(), Some("_/a/"));
        assert_eq!(
            removed.metadata.path_ids,
            Some(format!("{root}/{}/", a.id))
        );
        assert!(removed.metadata.deleted.is_some());

        fx.dirs.remove(&b.id, false).await.unwrap();
        fx.dirs.remove(&ObjectId::generate(), false).await.unwrap();
        fx.dirs.remove(&ObjectId::generate(), true).await.unwrap();
    }

    #[tokio::test]
    async fn restore_returns_to_original_place() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let b = fx.dirs.create(&a.id, "b").await.unwrap();
        fx.dirs.remove(&b.id, false).await.unwrap();

        let restored = fx.dirs.restore(&b.id).await.unwrap();
        assert!(!restored.removed);
        assert_eq!(restored.name, "b");
        assert_eq!(restored.parent_id.as_ref(), Some(&a.id));
        assert!(!restored.metadata.is_deletion_captured());
        assert!(restored.metadata.deleted.is_none());

        let err = fx.dirs.restore(&b.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn restore_directly_under_root() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        fx.dirs.remove(&a.id, false).await.unwrap();
        let restored = fx.dirs.restore(&a.id).await.unwrap();
        assert_eq!(restored.parent_id.as_ref(), Some(&root));
        assert_eq!(restored.name, "a");
    }

    #[tokio::test]
    async fn restore_into_taken_slot_gets_restored_suffix() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        fx.dirs.remove(&a.id, false).await.unwrap();
        fx.dirs.create(&root, "a").await.unwrap();

        let restored = fx.dirs.restore(&a.id).await.unwrap();
        assert!(restored.name.starts_with("a_restored_"), "{}", restored.name);
    }

    #[tokio::test]
    async fn restore_recreates_deleted_ancestors() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let b = fx.dirs.create(&a.id, "b").await.unwrap();
        let c = fx.dirs.create(&b.id, "c").await.unwrap();
        fx.dirs.remove(&c.id, false).await.unwrap();

        // Park `c` under the root so deleting `a` leaves it behind.
        let parked = root.clone();
        fx.store
            .update_one(
                &Filter::by_id(&c.id),
                &Update::set(move |e: &mut Element| e.parent_id = Some(parked.clone())),
            )
            .await
            .unwrap();
        fx.dirs.remove(&a.id, true).await.unwrap();

        let restored = fx.dirs.restore(&c.id).await.unwrap();
        let parent = fx.dirs.get(restored.parent_id.as_ref().unwrap()).await.unwrap();
        assert_eq!(parent.name, "b");
        assert_ne!(parent.id, b.id);
        let grandparent = fx.dirs.get(parent.parent_id.as_ref().unwrap()).await.unwrap();
        assert_eq!(grandparent.name, "a");
        assert_eq!(grandparent.parent_id.as_ref(), Some(&root));
    }

    #[tokio::test]
    async fn permanent_remove_deletes_subtree_and_tombstones_files() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let sub = fx.dirs.create(&a.id, "sub").await.unwrap();
        let f = fx.files.create(&sub.id, "f", b"0123456789").await.unwrap();
        let gone = fx.files.create(&a.id, "g", b"x").await.unwrap();
        fx.files.remove(&gone.id, false).await.unwrap();

        fx.dirs.remove(&a.id, true).await.unwrap();
        assert_eq!(fx.store.collection_len("elements"), 1);
        let map = fx.files.chunks().stat(&f.id).await.unwrap().unwrap();
        assert!(map.removed);

        let reclaimed = fx.files.chunks().sweep().await.unwrap();
        assert_eq!(reclaimed.len(), 2);
        assert_eq!(fx.store.collection_len("chunks"), 0);
        assert_eq!(fx.locks.live_locks(), 0);
    }

    #[tokio::test]
    async fn failed_permanent_remove_changes_nothing() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let f = fx.files.create(&a.id, "f", b"data").await.unwrap();

        fx.store.fail_next_commits(1);
        let err = fx.dirs.remove(&a.id, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transaction);
        assert_eq!(fx.store.collection_len("elements"), 3);
        assert!(!fx.files.chunks().stat(&f.id).await.unwrap().unwrap().removed);
        assert_eq!(fx.locks.live_locks(), 0);
    }

    // -----------------------------------------------------------------------
    // Find
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn find_recurses_into_live_directories_only() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "reports").await.unwrap();
        let hidden = fx.dirs.create(&a.id, "hidden").await.unwrap();
        fx.files.create(&a.id, "report-1.txt", b"1").await.unwrap();
        fx.files.create(&hidden.id, "report-2.txt", b"2").await.unwrap();
        fx.dirs.remove(&hidden.id, false).await.unwrap();

        let query = ElementQuery::new().name(Condition::Contains("report".into()));
        let mut found: Vec<String> = fx
            .dirs
            .find(&root, &query)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        found.sort();
        assert_eq!(found, ["report-1.txt", "reports"]);

        let removed = fx
            .dirs
            .find(&root, &ElementQuery::new().removed(true))
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, hidden.id);
    }

    #[tokio::test]
    async fn find_pinned_ids_short_circuit() {
        let fx = fixture().await;
        let root = fx.dirs.root_id().clone();
        let a = fx.dirs.create(&root, "a").await.unwrap();
        let b = fx.dirs.create(&a.id, "b").await.unwrap();
        fx.dirs.remove(&b.id, false).await.unwrap();

        let by_id = ElementQuery::by_id(b.id.clone()).name(Condition::Eq("nope".into()));
        let found = fx.dirs.find(&root, &by_id).await.unwrap();
        assert_eq!(found.len(), 1);

        let by_parent = fx
            .dirs
            .find(&root, &ElementQuery::by_parent(a.id.clone()))
            .await
            .unwrap();
        assert_eq!(by_parent.len(), 1);
        assert!(by_parent[0].removed);
    }
}
