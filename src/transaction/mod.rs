// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Per-batch transactions for the in-memory engine: changes are staged on the
// transaction and applied to the tables in one step at commit.
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{TransactionManager, TransactionStats};
pub use state::{Transaction, TransactionId, TransactionState};
