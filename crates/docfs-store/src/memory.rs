use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use docfs_types::ObjectId;
use tracing::{debug, warn};

use crate::codec::{decode, encode};
use crate::document::{Document, Filter, Update};
use crate::error::{StoreError, StoreResult};
use crate::traits::DocumentStore;
use crate::transaction::{Transaction, TxOp};

pub(crate) type Collection = BTreeMap<ObjectId, Vec<u8>>;
pub(crate) type Collections = HashMap<String, Collection>;

/// In-memory document store.
///
/// Records are held bincode-encoded, one ordered map per collection, behind
/// a `RwLock`. Intended for tests, the CLI and embedding; see
/// [`MemoryStore::save`] for persisting a snapshot between runs.
pub struct MemoryStore {
    pub(crate) collections: RwLock<Collections>,
    failing_commits: AtomicUsize,
    nth_failing_commit: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_collections(HashMap::new())
    }

    pub(crate) fn from_collections(collections: Collections) -> Self {
        Self {
            collections: RwLock::new(collections),
            failing_commits: AtomicUsize::new(0),
            nth_failing_commit: AtomicUsize::new(0),
        }
    }

    /// Number of records in a collection.
    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .expect("lock poisoned")
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Total records across all collections.
    pub fn len(&self) -> usize {
        self.collections
            .read()
            .expect("lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `n` calls to [`commit`](DocumentStore::commit) fail
    /// without applying anything.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Let `n - 1` commits through, then fail the `n`th one. Zero disarms.
    pub fn fail_nth_commit(&self, n: usize) {
        self.nth_failing_commit.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        let countdown = self
            .nth_failing_commit
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if countdown == Ok(1) {
            return true;
        }
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.len())
            .finish()
    }
}

fn matching<T: Document>(
    collection: Option<&Collection>,
    filter: &Filter<T>,
    limit: Option<usize>,
) -> StoreResult<Vec<T>> {
    let Some(collection) = collection else {
        return Ok(Vec::new());
    };
    if let Some(id) = filter.pinned_id() {
        return match collection.get(id) {
            Some(bytes) => {
                let doc: T = decode(bytes)?;
                Ok(if filter.matches(&doc) { vec![doc] } else { Vec::new() })
            }
            None => Ok(Vec::new()),
        };
    }
    let mut out = Vec::new();
    for bytes in collection.values() {
        let doc: T = decode(bytes)?;
        if filter.matches(&doc) {
            out.push(doc);
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
        }
    }
    Ok(out)
}

fn apply_update<T: Document>(doc: &mut T, update: &Update<T>) -> StoreResult<()> {
    let expected = doc.id().clone();
    update.apply(doc);
    if doc.id() != &expected {
        return Err(StoreError::IdMismatch {
            expected,
            found: doc.id().clone(),
        });
    }
    Ok(())
}

/// Value of a record as seen through the staged writes of a transaction.
fn staged_value<'a>(
    collections: &'a Collections,
    staged: &'a HashMap<(&'static str, ObjectId), Option<Vec<u8>>>,
    collection: &'static str,
    id: &ObjectId,
) -> Option<&'a [u8]> {
    match staged.get(&(collection, id.clone())) {
        Some(value) => value.as_deref(),
        None => collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(Vec::as_slice),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one<T: Document>(&self, doc: &T) -> StoreResult<()> {
        let bytes = encode(doc)?;
        let mut collections = self.collections.write().expect("lock poisoned");
        let collection = collections.entry(T::COLLECTION.to_string()).or_default();
        if collection.contains_key(doc.id()) {
            return Err(StoreError::DuplicateKey {
                collection: T::COLLECTION,
                id: doc.id().clone(),
            });
        }
        collection.insert(doc.id().clone(), bytes);
        Ok(())
    }

    async fn insert_many<T: Document>(&self, docs: &[T]) -> StoreResult<()> {
        let encoded = docs
            .iter()
            .map(|d| Ok((d.id().clone(), encode(d)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        let mut collections = self.collections.write().expect("lock poisoned");
        let collection = collections.entry(T::COLLECTION.to_string()).or_default();
        for (i, (id, _)) in encoded.iter().enumerate() {
            if collection.contains_key(id) || encoded[..i].iter().any(|(other, _)| other == id) {
                return Err(StoreError::DuplicateKey {
                    collection: T::COLLECTION,
                    id: id.clone(),
                });
            }
        }
        collection.extend(encoded);
        Ok(())
    }

    async fn find<T: Document>(&self, filter: &Filter<T>) -> StoreResult<Vec<T>> {
        let collections = self.collections.read().expect("lock poisoned");
        matching(collections.get(T::COLLECTION), filter, None)
    }

    async fn find_one<T: Document>(&self, filter: &Filter<T>) -> StoreResult<Option<T>> {
        let collections = self.collections.read().expect("lock poisoned");
        Ok(matching(collections.get(T::COLLECTION), filter, Some(1))?
            .into_iter()
            .next())
    }

    async fn count<T: Document>(&self, filter: &Filter<T>) -> StoreResult<usize> {
        let collections = self.collections.read().expect("lock poisoned");
        Ok(matching(collections.get(T::COLLECTION), filter, None)?.len())
    }

    async fn update_one<T: Document>(
        &self,
        filter: &Filter<T>,
        update: &Update<T>,
    ) -> StoreResult<bool> {
        Ok(self.find_one_and_update(filter, update).await?.is_some())
    }

    async fn update_many<T: Document>(
        &self,
        filter: &Filter<T>,
        update: &Update<T>,
    ) -> StoreResult<usize> {
        let mut collections = self.collections.write().expect("lock poisoned");
        let mut docs = matching(collections.get(T::COLLECTION), filter, None)?;
        let mut encoded = Vec::with_capacity(docs.len());
        for doc in &mut docs {
            apply_update(doc, update)?;
            encoded.push((doc.id().clone(), encode(doc)?));
        }
        let count = encoded.len();
        collections
            .entry(T::COLLECTION.to_string())
            .or_default()
            .extend(encoded);
        Ok(count)
    }

    async fn find_one_and_update<T: Document>(
        &self,
        filter: &Filter<T>,
        update: &Update<T>,
    ) -> StoreResult<Option<T>> {
        let mut collections = self.collections.write().expect("lock poisoned");
        let Some(mut doc) = matching(collections.get(T::COLLECTION), filter, Some(1))?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        apply_update(&mut doc, update)?;
        let bytes = encode(&doc)?;
        collections
            .entry(T::COLLECTION.to_string())
            .or_default()
            .insert(doc.id().clone(), bytes);
        Ok(Some(doc))
    }

    async fn find_one_and_replace<T: Document>(
        &self,
        filter: &Filter<T>,
        replacement: &T,
    ) -> StoreResult<Option<T>> {
        let bytes = encode(replacement)?;
        let mut collections = self.collections.write().expect("lock poisoned");
        let Some(previous) = matching(collections.get(T::COLLECTION), filter, Some(1))?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        if previous.id() != replacement.id() {
            return Err(StoreError::IdMismatch {
                expected: previous.id().clone(),
                found: replacement.id().clone(),
            });
        }
        collections
            .entry(T::COLLECTION.to_string())
            .or_default()
            .insert(previous.id().clone(), bytes);
        Ok(Some(previous))
    }

    async fn find_one_and_delete<T: Document>(
        &self,
        filter: &Filter<T>,
    ) -> StoreResult<Option<T>> {
        let mut collections = self.collections.write().expect("lock poisoned");
        let Some(doc) = matching(collections.get(T::COLLECTION), filter, Some(1))?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        if let Some(collection) = collections.get_mut(T::COLLECTION) {
            collection.remove(doc.id());
        }
        Ok(Some(doc))
    }

    async fn delete_one<T: Document>(&self, filter: &Filter<T>) -> StoreResult<bool> {
        Ok(self.find_one_and_delete(filter).await?.is_some())
    }

    async fn delete_many<T: Document>(&self, filter: &Filter<T>) -> StoreResult<usize> {
        let mut collections = self.collections.write().expect("lock poisoned");
        let docs = matching(collections.get(T::COLLECTION), filter, None)?;
        if let Some(collection) = collections.get_mut(T::COLLECTION) {
            for doc in &docs {
                collection.remove(doc.id());
            }
        }
        Ok(docs.len())
    }

    async fn commit(&self, tx: Transaction) -> StoreResult<()> {
        if self.take_injected_failure() {
            warn!(ops = tx.len(), "injected commit failure");
            return Err(StoreError::TransactionAborted("injected failure".into()));
        }

        let ops = tx.ops.len();
        let mut collections = self.collections.write().expect("lock poisoned");
        let mut staged: HashMap<(&'static str, ObjectId), Option<Vec<u8>>> = HashMap::new();

        for op in tx.ops {
            match op {
                TxOp::Insert {
                    collection,
                    id,
                    bytes,
                } => {
                    if staged_value(&collections, &staged, collection, &id).is_some() {
                        let err = StoreError::DuplicateKey { collection, id };
                        return Err(StoreError::TransactionAborted(err.to_string()));
                    }
                    staged.insert((collection, id), Some(bytes));
                }
                TxOp::Replace {
                    collection,
                    id,
                    bytes,
                } => {
                    if staged_value(&collections, &staged, collection, &id).is_none() {
                        let err = StoreError::NotFound { collection, id };
                        return Err(StoreError::TransactionAborted(err.to_string()));
                    }
                    staged.insert((collection, id), Some(bytes));
                }
                TxOp::Update {
                    collection,
                    id,
                    apply,
                } => {
                    let Some(current) = staged_value(&collections, &staged, collection, &id)
                        .map(<[u8]>::to_vec)
                    else {
                        let err = StoreError::NotFound { collection, id };
                        return Err(StoreError::TransactionAborted(err.to_string()));
                    };
                    let updated = apply(current.as_slice())
                        .map_err(|e| StoreError::TransactionAborted(e.to_string()))?;
                    staged.insert((collection, id), Some(updated));
                }
                TxOp::Delete { collection, id } => {
                    staged.insert((collection, id), None);
                }
            }
        }

        for ((collection, id), value) in staged {
            let collection = collections.entry(collection.to_string()).or_default();
            match value {
                Some(bytes) => {
                    collection.insert(id, bytes);
                }
                None => {
                    collection.remove(&id);
                }
            }
        }
        debug!(ops, "transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docfs_types::Element;

    fn dir(name: &str) -> Element {
        Element::directory(ObjectId::generate(), name)
    }

    // -----------------------------------------------------------------------
    // Single-record operations
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn insert_and_find_by_id() {
        let store = MemoryStore::new();
        let e = dir("a");
        store.insert_one(&e).await.unwrap();
        let found = store.find_one(&Filter::by_id(&e.id)).await.unwrap();
        assert_eq!(found, Some(e));
        assert_eq!(store.collection_len("elements"), 1);
    }

    #[tokio::test]
    async fn insert_duplicate_id_fails() {
        let store = MemoryStore::new();
        let e = dir("a");
        store.insert_one(&e).await.unwrap();
        let err = store.insert_one(&e).await.unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[tokio::test]
    async fn find_scans_in_id_order() {
        let store = MemoryStore::new();
        let a = dir("a");
        let b = dir("b");
        let c = dir("a");
        store.insert_one(&c).await.unwrap();
        store.insert_one(&a).await.unwrap();
        store.insert_one(&b).await.unwrap();

        let named_a = store
            .find(&Filter::new(|e: &Element| e.name == "a"))
            .await
            .unwrap();
        assert_eq!(named_a.len(), 2);
        assert!(named_a[0].id < named_a[1].id);
        assert_eq!(store.count(&Filter::<Element>::all()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn find_one_and_update_returns_updated() {
        let store = MemoryStore::new();
        let e = dir("a");
        store.insert_one(&e).await.unwrap();
        let updated = store
            .find_one_and_update(
                &Filter::by_id(&e.id),
                &Update::set(|d: &mut Element| d.name = "b".into()),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "b");

        let missing = store
            .update_one(
                &Filter::by_id(&ObjectId::generate()),
                &Update::set(|d: &mut Element| d.removed = true),
            )
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn update_cannot_change_id() {
        let store = MemoryStore::new();
        let e = dir("a");
        store.insert_one(&e).await.unwrap();
        let err = store
            .update_one(
                &Filter::by_id(&e.id),
                &Update::set(|d: &mut Element| d.id = ObjectId::generate()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IdMismatch { .. }));
    }

    #[tokio::test]
    async fn replace_returns_previous() {
        let store = MemoryStore::new();
        let e = dir("a");
        store.insert_one(&e).await.unwrap();
        let mut next = e.clone();
        next.name = "renamed".into();
        let prev = store
            .find_one_and_replace(&Filter::by_id(&e.id), &next)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prev.name, "a");
        let now: Element = store.find_one(&Filter::by_id(&e.id)).await.unwrap().unwrap();
        assert_eq!(now.name, "renamed");
    }

    #[tokio::test]
    async fn delete_operations() {
        let store = MemoryStore::new();
        for name in ["a", "a", "b"] {
            store.insert_one(&dir(name)).await.unwrap();
        }
        let removed = store
            .delete_many(&Filter::new(|e: &Element| e.name == "a"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let last = store
            .find_one_and_delete(&Filter::<Element>::all())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.name, "b");
        assert!(store.is_empty());
        assert!(!store.delete_one(&Filter::<Element>::all()).await.unwrap());
    }

    #[tokio::test]
    async fn update_many_counts_matches() {
        let store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store.insert_one(&dir(name)).await.unwrap();
        }
        let n = store
            .update_many(
                &Filter::new(|e: &Element| e.name != "b"),
                &Update::set(|e: &mut Element| e.removed = true),
            )
            .await
            .unwrap();
        assert_eq!(n, 2);
        let removed = store
            .count(&Filter::new(|e: &Element| e.removed))
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn insert_many_is_all_or_nothing() {
        let store = MemoryStore::new();
        let a = dir("a");
        store.insert_one(&a).await.unwrap();
        let err = store
            .insert_many(&[dir("b"), a.clone()])
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.len(), 1);

        let c = dir("c");
        let err = store.insert_many(&[c.clone(), c]).await.unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.len(), 1);
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn commit_applies_every_op() {
        let store = MemoryStore::new();
        let a = dir("a");
        let b = dir("b");
        store.insert_one(&a).await.unwrap();

        let mut tx = Transaction::new();
        tx.insert(&b).unwrap();
        tx.update(&a.id, Update::set(|e: &mut Element| e.name = "a2".into()));
        tx.update(&b.id, Update::set(|e: &mut Element| e.removed = true));
        store.commit(tx).await.unwrap();

        let a2: Element = store.find_one(&Filter::by_id(&a.id)).await.unwrap().unwrap();
        let b2: Element = store.find_one(&Filter::by_id(&b.id)).await.unwrap().unwrap();
        assert_eq!(a2.name, "a2");
        assert!(b2.removed);
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = MemoryStore::new();
        let a = dir("a");
        store.insert_one(&a).await.unwrap();

        let mut tx = Transaction::new();
        tx.insert(&dir("new")).unwrap();
        tx.update(&a.id, Update::set(|e: &mut Element| e.name = "changed".into()));
        tx.insert(&a).unwrap();
        let err = store.commit(tx).await.unwrap_err();
        assert!(matches!(err, StoreError::TransactionAborted(_)));

        assert_eq!(store.len(), 1);
        let a2: Element = store.find_one(&Filter::by_id(&a.id)).await.unwrap().unwrap();
        assert_eq!(a2.name, "a");
    }

    #[tokio::test]
    async fn update_of_missing_record_aborts() {
        let store = MemoryStore::new();
        let mut tx = Transaction::new();
        tx.insert(&dir("x")).unwrap();
        tx.update(
            &ObjectId::generate(),
            Update::set(|e: &mut Element| e.removed = true),
        );
        assert!(store.commit(tx).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn insert_then_delete_in_one_commit() {
        let store = MemoryStore::new();
        let a = dir("a");
        let mut tx = Transaction::new();
        tx.insert(&a).unwrap();
        tx.delete::<Element>(&a.id);
        tx.delete::<Element>(&ObjectId::generate());
        store.commit(tx).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn injected_failure_is_consumed() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        let mut tx = Transaction::new();
        tx.insert(&dir("a")).unwrap();
        assert!(store.commit(tx).await.is_err());
        assert!(store.is_empty());

        let mut tx = Transaction::new();
        tx.insert(&dir("a")).unwrap();
        store.commit(tx).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn nth_commit_failure_lets_earlier_commits_through() {
        let store = MemoryStore::new();
        store.fail_nth_commit(2);
        for (name, ok) in [("a", true), ("b", false), ("c", true)] {
            let mut tx = Transaction::new();
            tx.insert(&dir(name)).unwrap();
            assert_eq!(store.commit(tx).await.is_ok(), ok, "commit of {name}");
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn aborted_transaction_is_dropped() {
        let mut tx = Transaction::new();
        tx.insert(&dir("a")).unwrap();
        assert_eq!(tx.len(), 1);
        tx.abort();
    }
}
