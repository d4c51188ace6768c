// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Transaction, TransactionId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Counters describing transaction activity of one storage instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub aborted: u64,
    pub active: usize,
}

#[derive(Default)]
pub struct TransactionManager {
    active_ids: RwLock<HashSet<TransactionId>>,
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self) -> Transaction {
        let id = TransactionId::new();
        self.active_ids.write().await.insert(id);
        self.begun.fetch_add(1, Ordering::SeqCst);
        Transaction::new(id)
    }

    pub async fn finish_commit(&self, id: TransactionId) {
        self.active_ids.write().await.remove(&id);
        self.committed.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn finish_rollback(&self, id: TransactionId) {
        self.active_ids.write().await.remove(&id);
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.begun.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            aborted: self.aborted.load(Ordering::SeqCst),
            active: self.active_ids.read().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_track_lifecycle() {
        let manager = TransactionManager::new();
        let first = manager.begin().await;
        let second = manager.begin().await;
        assert_eq!(manager.stats().await.active, 2);

        manager.finish_commit(first.id()).await;
        manager.finish_rollback(second.id()).await;

        let stats = manager.stats().await;
        assert_eq!(stats, TransactionStats { begun: 2, committed: 1, aborted: 1, active: 0 });
    }
}
