use super::{StorageEngine, Table, TableSchema};
use super::table::duplicate_key;
use crate::core::{ArchiveError, Key, Result, Row, Value, validate_identifier};
use crate::scope::Predicate;
use crate::transaction::{Change, Transaction, TransactionId, TransactionManager, TransactionStats};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tokio::sync::RwLock;

/// Commit records kept by [`InMemoryStorage::new`] before the oldest are dropped.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1024;

/// Per-table row counts of one committed transaction, kept in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub txn: TransactionId,
    inserted: BTreeMap<String, usize>,
    deleted: BTreeMap<String, usize>,
}

impl CommitRecord {
    fn summarize(txn: TransactionId, changes: &[Change]) -> Self {
        let mut record = Self {
            txn,
            inserted: BTreeMap::new(),
            deleted: BTreeMap::new(),
        };
        for change in changes {
            let counts = if change.is_insert() {
                &mut record.inserted
            } else {
                &mut record.deleted
            };
            *counts.entry(change.table_name().to_string()).or_default() += 1;
        }
        record
    }

    pub fn inserted_into(&self, table: &str) -> usize {
        self.inserted.get(table).copied().unwrap_or(0)
    }

    pub fn deleted_from(&self, table: &str) -> usize {
        self.deleted.get(table).copied().unwrap_or(0)
    }
}

#[derive(Default)]
struct Database {
    tables: HashMap<String, Table>,
    /// Convenience visibility filters, applied by the `scoped_*` readers only
    default_scopes: HashMap<String, Predicate>,
    journal: VecDeque<CommitRecord>,
    journal_capacity: usize,
}

impl Database {
    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| ArchiveError::TableNotFound(name.to_string()))
    }

    /// Row visible to `tx`: committed and not deleted by it, or inserted by it.
    fn is_visible(&self, table: &Table, tx: &Transaction, key: &Key) -> bool {
        tx.inserted_row(table.name(), key).is_some()
            || (table.contains(key) && !tx.is_deleted(table.name(), key))
    }

    fn post_state_contains(&self, table: &str, tx: &Transaction, key: &Key) -> bool {
        match self.tables.get(table) {
            Some(t) => self.is_visible(t, tx, key),
            None => false,
        }
    }

    /// Rows of `table` as seen through `tx`: committed rows it has not
    /// deleted, then the rows it staged. Borrowed in place.
    fn visible_rows<'a>(
        &'a self,
        table: &'a Table,
        tx: &'a Transaction,
    ) -> impl Iterator<Item = &'a Row> + 'a {
        let committed = table
            .rows()
            .filter(move |(key, _)| !tx.is_deleted(table.name(), key))
            .map(|(_, row)| row);
        let staged = tx.staged_inserts(table.name()).into_iter().flat_map(BTreeMap::values);
        committed.chain(staged)
    }

    fn record(&mut self, record: CommitRecord) {
        if self.journal_capacity == 0 {
            return;
        }
        while self.journal.len() >= self.journal_capacity {
            self.journal.pop_front();
        }
        self.journal.push_back(record);
    }

    /// Everything a commit must guarantee before any table is modified.
    fn validate_commit(&self, tx: &Transaction) -> Result<()> {
        for name in tx.touched_tables() {
            let table = self.table(name)?;

            if let Some(deleted) = tx.staged_deletes(name) {
                for key in deleted {
                    if !table.contains(key) {
                        return Err(ArchiveError::Transaction(format!(
                            "row {} of '{}' was removed by a concurrent transaction",
                            key, name
                        )));
                    }
                }
            }

            if let Some(inserted) = tx.staged_inserts(name) {
                for (key, row) in inserted {
                    if table.contains(key) && !tx.is_deleted(name, key) {
                        return Err(duplicate_key(name, key));
                    }
                    self.check_references(table, row, tx)?;
                }
            }

            self.check_not_referenced(name, tx)?;
        }
        Ok(())
    }

    /// Every non-null foreign key of an inserted row must point at a row that
    /// exists once the transaction is applied.
    fn check_references(&self, table: &Table, row: &Row, tx: &Transaction) -> Result<()> {
        for fk in table.schema().foreign_keys() {
            let value = &row[table.column_index(&fk.column)?];
            if value.is_null() {
                continue;
            }
            let key = Key::try_from(value)?;
            if !self.post_state_contains(&fk.references, tx, &key) {
                return Err(ArchiveError::ConstraintViolation(format!(
                    "insert on table '{}' violates foreign key constraint: {}={} references non-existent key in '{}'",
                    table.name(),
                    fk.column,
                    value,
                    fk.references
                )));
            }
        }
        Ok(())
    }

    /// No surviving row may reference a key that `tx` deletes from `parent`.
    fn check_not_referenced(&self, parent: &str, tx: &Transaction) -> Result<()> {
        let removed: BTreeSet<&Key> = match tx.staged_deletes(parent) {
            Some(keys) => keys
                .iter()
                .filter(|key| tx.inserted_row(parent, key).is_none())
                .collect(),
            None => return Ok(()),
        };
        if removed.is_empty() {
            return Ok(());
        }

        for child in self.tables.values() {
            for fk in child.schema().foreign_keys().iter().filter(|fk| fk.references == parent) {
                let idx = child.column_index(&fk.column)?;
                for row in self.visible_rows(child, tx) {
                    let value = &row[idx];
                    if value.is_null() {
                        continue;
                    }
                    if removed.contains(&Key::try_from(value)?) {
                        return Err(ArchiveError::ConstraintViolation(format!(
                            "delete on table '{}' violates foreign key constraint: key {} is still referenced from '{}'",
                            parent, value, child.name()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, tx: &Transaction) {
        for name in tx.touched_tables() {
            let Some(table) = self.tables.get_mut(name) else {
                continue;
            };
            if let Some(deleted) = tx.staged_deletes(name) {
                for key in deleted {
                    table.remove(key);
                }
            }
            if let Some(inserted) = tx.staged_inserts(name) {
                for (key, row) in inserted {
                    table.apply_insert(key.clone(), row.clone());
                }
            }
        }
    }
}

/// In-memory relational store with per-transaction staging.
///
/// Live tables may declare foreign keys; they are enforced when a
/// transaction commits, so deleting a parent that still has live children
/// fails just as it would in PostgreSQL.
pub struct InMemoryStorage {
    db: RwLock<Database>,
    transactions: TransactionManager,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_journal_capacity(DEFAULT_JOURNAL_CAPACITY)
    }

    /// Keep at most `capacity` commit records; zero disables the journal.
    pub fn with_journal_capacity(capacity: usize) -> Self {
        Self {
            db: RwLock::new(Database {
                journal_capacity: capacity,
                ..Database::default()
            }),
            transactions: TransactionManager::new(),
        }
    }

    /// Create a table. Tables referenced by its foreign keys must exist.
    pub async fn create_table(&self, schema: TableSchema) -> Result<()> {
        validate_identifier(schema.name())?;
        for column in schema.schema().columns() {
            validate_identifier(&column.name)?;
        }

        let mut db = self.db.write().await;
        if db.tables.contains_key(schema.name()) {
            return Err(ArchiveError::TableExists(schema.name().to_string()));
        }
        for fk in schema.foreign_keys() {
            db.table(&fk.references)?;
        }

        let table = Table::new(schema)?;
        debug!("Created table '{}'", table.name());
        db.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// `CREATE TABLE name (LIKE source)`: same columns, no foreign keys.
    pub async fn create_table_like(&self, source: &str, name: &str) -> Result<()> {
        let schema = {
            let db = self.db.read().await;
            db.table(source)?.schema().like(name)
        };
        self.create_table(schema).await
    }

    /// Insert one row in its own transaction.
    pub async fn insert(&self, table: &str, row: Row) -> Result<Key> {
        let mut tx = self.begin().await?;
        let staged = {
            let db = self.db.read().await;
            db.table(table).and_then(|t| {
                let key = t.key_of(&row)?;
                if db.is_visible(t, &tx, &key) {
                    return Err(duplicate_key(table, &key));
                }
                Ok(key)
            })
        };
        let key = match staged.and_then(|key| tx.stage_insert(table, key.clone(), row).map(|_| key)) {
            Ok(key) => key,
            Err(err) => {
                self.rollback(tx).await?;
                return Err(err);
            }
        };
        self.commit(tx).await?;
        Ok(key)
    }

    pub async fn insert_many<I>(&self, table: &str, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Row>,
    {
        for row in rows {
            self.insert(table, row).await?;
        }
        Ok(())
    }

    /// Unscoped row count.
    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let db = self.db.read().await;
        Ok(db.table(table)?.row_count())
    }

    /// Unscoped rows in key order.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let db = self.db.read().await;
        Ok(db.table(table)?.rows().map(|(_, row)| row.clone()).collect())
    }

    pub async fn get_row(&self, table: &str, key: &Key) -> Result<Option<Row>> {
        let db = self.db.read().await;
        Ok(db.table(table)?.get(key).cloned())
    }

    /// Install a default visibility filter, like an ORM default scope.
    pub async fn set_default_scope(&self, table: &str, predicate: Predicate) -> Result<()> {
        let mut db = self.db.write().await;
        db.table(table)?.check_predicate(&predicate)?;
        db.default_scopes.insert(table.to_string(), predicate);
        Ok(())
    }

    pub async fn clear_default_scope(&self, table: &str) {
        self.db.write().await.default_scopes.remove(table);
    }

    /// Rows visible through the table's default scope.
    pub async fn scoped_rows(&self, table: &str) -> Result<Vec<Row>> {
        let db = self.db.read().await;
        let t = db.table(table)?;
        let scope = db.default_scopes.get(table).cloned().unwrap_or(Predicate::Everything);
        let mut rows = Vec::new();
        for (_, row) in t.rows() {
            if t.matches(row, &scope)? {
                rows.push(row.clone());
            }
        }
        Ok(rows)
    }

    pub async fn scoped_count(&self, table: &str) -> Result<usize> {
        Ok(self.scoped_rows(table).await?.len())
    }

    /// Retained commit records, oldest first.
    pub async fn journal(&self) -> Vec<CommitRecord> {
        self.db.read().await.journal.iter().cloned().collect()
    }

    /// Drain the journal.
    pub async fn take_journal(&self) -> Vec<CommitRecord> {
        self.db.write().await.journal.drain(..).collect()
    }

    pub async fn transaction_stats(&self) -> TransactionStats {
        self.transactions.stats().await
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    type Transaction = Transaction;

    async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let db = self.db.read().await;
        Ok(db.table(table)?.schema().schema().column_names())
    }

    async fn count(&self, table: &str, predicate: &Predicate) -> Result<usize> {
        let db = self.db.read().await;
        db.table(table)?.count_matching(predicate)
    }

    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        predicate: &Predicate,
        after: Option<&Key>,
        limit: usize,
    ) -> Result<Vec<Key>> {
        let db = self.db.read().await;
        let t = db.table(table)?;
        ensure_primary_key(t, key_column)?;
        t.keys_after(predicate, after, limit)
    }

    async fn begin(&self) -> Result<Transaction> {
        Ok(self.transactions.begin().await)
    }

    async fn copy_rows(
        &self,
        tx: &mut Transaction,
        from: &str,
        to: &str,
        columns: &[String],
        predicate: &Predicate,
    ) -> Result<usize> {
        let staged: Vec<(Key, Row)> = {
            let db = self.db.read().await;
            let source = db.table(from)?;
            let dest = db.table(to)?;
            source.check_predicate(predicate)?;

            let mapping: Vec<(usize, usize)> = columns
                .iter()
                .map(|c| Ok((source.column_index(c)?, dest.column_index(c)?)))
                .collect::<Result<_>>()?;
            let width = dest.schema().schema().column_count();

            let mut staged = Vec::new();
            if !predicate.is_nothing() {
                for row in db.visible_rows(source, tx) {
                    if !source.matches(row, predicate)? {
                        continue;
                    }
                    let mut copy = vec![Value::Null; width];
                    for (src, dst) in &mapping {
                        copy[*dst] = row[*src].clone();
                    }
                    let key = dest.key_of(&copy)?;
                    if db.is_visible(dest, tx, &key) {
                        return Err(duplicate_key(to, &key));
                    }
                    staged.push((key, copy));
                }
            }
            staged
        };

        let inserted = staged.len();
        for (key, row) in staged {
            tx.stage_insert(to, key, row)?;
        }
        Ok(inserted)
    }

    async fn delete_rows(
        &self,
        tx: &mut Transaction,
        table: &str,
        key_column: &str,
        keys: &[Key],
    ) -> Result<usize> {
        let doomed: Vec<Key> = {
            let db = self.db.read().await;
            let t = db.table(table)?;
            ensure_primary_key(t, key_column)?;
            let unique: BTreeSet<&Key> = keys.iter().collect();
            unique
                .into_iter()
                .filter(|key| db.is_visible(t, tx, key))
                .cloned()
                .collect()
        };

        let deleted = doomed.len();
        for key in doomed {
            tx.stage_delete(table, key)?;
        }
        Ok(deleted)
    }

    async fn commit(&self, mut tx: Transaction) -> Result<()> {
        let mut db = self.db.write().await;
        if let Err(err) = db.validate_commit(&tx) {
            drop(db);
            warn!("Commit of {} failed, rolling back: {}", tx.id(), err);
            tx.rollback()?;
            self.transactions.finish_rollback(tx.id()).await;
            return Err(err);
        }

        db.apply(&tx);
        tx.commit()?;
        let id = tx.id();
        debug!("Committed {} with {} changes", id, tx.change_count());
        db.record(CommitRecord::summarize(id, tx.changes()));
        drop(db);

        self.transactions.finish_commit(id).await;
        Ok(())
    }

    async fn rollback(&self, mut tx: Transaction) -> Result<()> {
        debug!("Rolling back {} ({} staged changes)", tx.id(), tx.change_count());
        tx.rollback()?;
        self.transactions.finish_rollback(tx.id()).await;
        Ok(())
    }
}

fn ensure_primary_key(table: &Table, key_column: &str) -> Result<()> {
    table.column_index(key_column)?;
    if table.primary_key_column() != key_column {
        return Err(ArchiveError::InvalidConfig(format!(
            "'{}' is not the primary key of '{}'",
            key_column,
            table.name()
        )));
    }
    Ok(())
}
