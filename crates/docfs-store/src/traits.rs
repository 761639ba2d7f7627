use async_trait::async_trait;

use crate::document::{Document, Filter, Update};
use crate::error::StoreResult;
use crate::transaction::Transaction;

/// Contract between docfs and its backing document store.
///
/// Methods are generic over the record type, so the trait is used as a
/// type parameter rather than a trait object. Every method may suspend.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Insert a record; fails with `DuplicateKey` if the id is taken.
    async fn insert_one<T: Document>(&self, doc: &T) -> StoreResult<()>;

    /// Insert several records; none are inserted if any id is taken.
    async fn insert_many<T: Document>(&self, docs: &[T]) -> StoreResult<()>;

    /// All matching records, in id order.
    async fn find<T: Document>(&self, filter: &Filter<T>) -> StoreResult<Vec<T>>;

    /// First matching record in id order.
    async fn find_one<T: Document>(&self, filter: &Filter<T>) -> StoreResult<Option<T>>;

    async fn count<T: Document>(&self, filter: &Filter<T>) -> StoreResult<usize>;

    /// Apply `update` to the first match. Returns whether a record matched.
    async fn update_one<T: Document>(
        &self,
        filter: &Filter<T>,
        update: &Update<T>,
    ) -> StoreResult<bool>;

    /// Apply `update` to every match. Returns the number updated.
    async fn update_many<T: Document>(
        &self,
        filter: &Filter<T>,
        update: &Update<T>,
    ) -> StoreResult<usize>;

    /// Apply `update` to the first match and return the updated record.
    async fn find_one_and_update<T: Document>(
        &self,
        filter: &Filter<T>,
        update: &Update<T>,
    ) -> StoreResult<Option<T>>;

    /// Replace the first match with `replacement`, returning the previous record.
    async fn find_one_and_replace<T: Document>(
        &self,
        filter: &Filter<T>,
        replacement: &T,
    ) -> StoreResult<Option<T>>;

    /// Delete the first match and return it.
    async fn find_one_and_delete<T: Document>(&self, filter: &Filter<T>)
        -> StoreResult<Option<T>>;

    async fn delete_one<T: Document>(&self, filter: &Filter<T>) -> StoreResult<bool>;

    async fn delete_many<T: Document>(&self, filter: &Filter<T>) -> StoreResult<usize>;

    /// Apply every staged operation atomically.
    async fn commit(&self, tx: Transaction) -> StoreResult<()>;
}
