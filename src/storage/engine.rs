use async_trait::async_trait;
use crate::core::{Key, Result};
use crate::scope::Predicate;

/// Storage engine trait - the narrow capability the cascade needs from a
/// relational store.
///
/// Every read is unscoped: implementations must evaluate predicates against
/// all physically present rows, never through a default visibility filter.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Handle for one insert+delete unit of work.
    type Transaction: Send;

    /// Ordered column names of a table (its full row shape).
    async fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Number of rows matching `predicate`.
    async fn count(&self, table: &str, predicate: &Predicate) -> Result<usize>;

    /// Up to `limit` keys greater than `after` whose rows match `predicate`,
    /// in ascending key order.
    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        predicate: &Predicate,
        after: Option<&Key>,
        limit: usize,
    ) -> Result<Vec<Key>>;

    async fn begin(&self) -> Result<Self::Transaction>;

    /// `INSERT INTO to (columns) SELECT columns FROM from WHERE predicate`.
    /// Returns the number of rows inserted.
    async fn copy_rows(
        &self,
        tx: &mut Self::Transaction,
        from: &str,
        to: &str,
        columns: &[String],
        predicate: &Predicate,
    ) -> Result<usize>;

    /// Delete the rows whose `key_column` is one of `keys`. Returns the number
    /// of rows deleted.
    async fn delete_rows(
        &self,
        tx: &mut Self::Transaction,
        table: &str,
        key_column: &str,
        keys: &[Key],
    ) -> Result<usize>;

    async fn commit(&self, tx: Self::Transaction) -> Result<()>;

    async fn rollback(&self, tx: Self::Transaction) -> Result<()>;
}
