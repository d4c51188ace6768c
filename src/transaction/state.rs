// ============================================================================
// Transaction State Management
// ============================================================================
//
// Lifecycle: Active -> Committed | Aborted.
//
// While active, a transaction stages its inserts and deletes on top of the
// committed tables without touching them. Reads made through the
// transaction see committed rows minus staged deletes plus staged inserts.
//
// ============================================================================

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use super::Change;
use crate::core::{ArchiveError, Key, Result, Row};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    /// Staged operations in execution order
    changes: Vec<Change>,
    inserts: HashMap<String, BTreeMap<Key, Row>>,
    deletes: HashMap<String, BTreeSet<Key>>,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            changes: Vec::new(),
            inserts: HashMap::new(),
            deletes: HashMap::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Tables this transaction writes to.
    pub fn touched_tables(&self) -> BTreeSet<&str> {
        self.changes.iter().map(Change::table_name).collect()
    }

    pub fn staged_inserts(&self, table: &str) -> Option<&BTreeMap<Key, Row>> {
        self.inserts.get(table)
    }

    pub fn staged_deletes(&self, table: &str) -> Option<&BTreeSet<Key>> {
        self.deletes.get(table)
    }

    pub fn is_deleted(&self, table: &str, key: &Key) -> bool {
        self.deletes.get(table).is_some_and(|keys| keys.contains(key))
    }

    pub fn inserted_row(&self, table: &str, key: &Key) -> Option<&Row> {
        self.inserts.get(table).and_then(|rows| rows.get(key))
    }

    fn ensure_active(&self, action: &str) -> Result<()> {
        if !self.state.is_active() {
            return Err(ArchiveError::Transaction(format!(
                "Cannot {}: transaction {} is {}",
                action, self.id, self.state
            )));
        }
        Ok(())
    }

    /// Stage an insert. The caller has already checked the key against
    /// committed rows.
    pub fn stage_insert(&mut self, table: &str, key: Key, row: Row) -> Result<()> {
        self.ensure_active("stage insert")?;
        let rows = self.inserts.entry(table.to_string()).or_default();
        if rows.contains_key(&key) {
            return Err(crate::storage::table::duplicate_key(table, &key));
        }
        rows.insert(key.clone(), row);
        self.changes.push(Change::InsertRow {
            table: table.to_string(),
            key,
        });
        Ok(())
    }

    /// Stage a delete of a row visible to this transaction.
    pub fn stage_delete(&mut self, table: &str, key: Key) -> Result<()> {
        self.ensure_active("stage delete")?;
        let unstaged = self
            .inserts
            .get_mut(table)
            .and_then(|rows| rows.remove(&key))
            .is_some();
        if !unstaged {
            self.deletes.entry(table.to_string()).or_default().insert(key.clone());
        }
        self.changes.push(Change::DeleteRow {
            table: table.to_string(),
            key,
        });
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active("commit")?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active("rollback")?;
        self.changes.clear();
        self.inserts.clear();
        self.deletes.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}
