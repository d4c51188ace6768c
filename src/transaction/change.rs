// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Each Change is one staged row operation. A transaction records them in
// order next to its staged rows; commit summarizes them per table for the
// commit journal, rollback discards them.
//
// ============================================================================

use crate::core::Key;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert a full row into a table
    InsertRow { table: String, key: Key },

    /// Delete the row with the given key
    DeleteRow { table: String, key: Key },
}

impl Change {
    /// Get the table name affected by this change
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::DeleteRow { table, .. } => table,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Change::InsertRow { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Change::DeleteRow { .. })
    }
}
