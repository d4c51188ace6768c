// ============================================================================
// Batch Cursor
// ============================================================================
//
// Pages a selection into bounded, ascending batches of primary keys using
// keyset ("seek") pagination: every page asks for the next keys greater than
// the last one already yielded that still match the predicate. Rows moved out
// from under the cursor between pages simply stop matching, so the cursor
// never skips or repeats a row the way offset paging would.
//
// ============================================================================

use futures::Stream;
use futures::stream;
use crate::core::{ArchiveError, Key, Result};
use crate::scope::Predicate;
use crate::storage::StorageEngine;

/// A non-empty, ascending set of primary keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    keys: Vec<Key>,
}

impl Batch {
    /// `None` for an empty key list.
    pub fn new(keys: Vec<Key>) -> Option<Self> {
        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn last(&self) -> &Key {
        &self.keys[self.keys.len() - 1]
    }

    /// `column IN (keys)`.
    pub fn predicate(&self, column: &str) -> Predicate {
        Predicate::key_in(column, &self.keys)
    }
}

pub struct BatchCursor<'a, S: StorageEngine> {
    storage: &'a S,
    table: String,
    key_column: String,
    predicate: Predicate,
    batch_size: usize,
    last: Option<Key>,
    exhausted: bool,
}

impl<'a, S: StorageEngine> BatchCursor<'a, S> {
    pub fn new(
        storage: &'a S,
        table: impl Into<String>,
        key_column: impl Into<String>,
        predicate: Predicate,
        batch_size: usize,
    ) -> Self {
        let exhausted = predicate.is_nothing() || batch_size == 0;
        Self {
            storage,
            table: table.into(),
            key_column: key_column.into(),
            predicate,
            batch_size,
            last: None,
            exhausted,
        }
    }

    /// Fetch the next page; `None` once no matching key remains past the
    /// cursor. A selection that matches nothing never touches storage.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.exhausted {
            return Ok(None);
        }

        let keys = self
            .storage
            .select_keys(
                &self.table,
                &self.key_column,
                &self.predicate,
                self.last.as_ref(),
                self.batch_size,
            )
            .await?;

        // A short page means nothing past it matched when it was read
        if keys.len() < self.batch_size {
            self.exhausted = true;
        }

        match Batch::new(keys) {
            Some(batch) => {
                self.last = Some(batch.last().clone());
                Ok(Some(batch))
            }
            None => Ok(None),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Batch>> + 'a {
        stream::try_unfold(self, |mut cursor| async move {
            Ok::<_, ArchiveError>(cursor.next_batch().await?.map(|batch| (batch, cursor)))
        })
    }
}
