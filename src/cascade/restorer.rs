use async_recursion::async_recursion;
use tracing::{Instrument, Level, event, info_span};
use super::mover::{mirrored_columns, move_batch};
use crate::config::ArchiveConfig;
use crate::core::Result;
use crate::cursor::BatchCursor;
use crate::graph::DependencyGraph;
use crate::scope::Selection;
use crate::storage::StorageEngine;

/// Moves archived rows back to their live tables, parents before children.
pub struct CascadeRestorer<'a, S: StorageEngine> {
    storage: &'a S,
    graph: &'a DependencyGraph,
    config: &'a ArchiveConfig,
}

impl<'a, S: StorageEngine> CascadeRestorer<'a, S> {
    pub fn new(storage: &'a S, graph: &'a DependencyGraph, config: &'a ArchiveConfig) -> Self {
        Self { storage, graph, config }
    }

    /// Restore the archived rows of `selection.entity` matching its
    /// predicate, then their archived dependents.
    pub async fn restore(&self, selection: Selection) -> Result<()> {
        let root = selection.entity.clone();
        let moved = self.restore_node(selection).await?;
        event!(Level::INFO, entity = %root, rows = moved, "restore finished");
        Ok(())
    }

    #[async_recursion]
    async fn restore_node(&self, selection: Selection) -> Result<usize> {
        let span = info_span!("cascade.restore", entity = %selection.entity);
        async move {
            let live = selection.entity.as_str();
            let archive = self.config.archive_table(live);
            let key_column = self.graph.primary_key_or(live, &self.config.default_primary_key);
            let children = self.graph.children_of(live);

            let mut cursor = BatchCursor::new(
                self.storage,
                archive.as_str(),
                key_column,
                selection.predicate.clone(),
                self.config.batch_size,
            );
            let mut columns: Option<Vec<String>> = None;
            let mut moved = 0;

            while let Some(batch) = cursor.next_batch().await? {
                event!(Level::DEBUG, keys = batch.len(), "restoring batch");

                if columns.is_none() {
                    columns = Some(mirrored_columns(self.storage, live, &archive).await?);
                }
                if let Some(columns) = &columns {
                    moved += move_batch(self.storage, &archive, live, columns, key_column, &batch).await?;
                }

                // Children reference the parent, so they go back only once it is live
                for child in &children {
                    let dependents = Selection::new(child.entity, batch.predicate(child.foreign_key));
                    moved += self.restore_node(dependents).await?;
                }
            }

            Ok(moved)
        }
        .instrument(span)
        .await
    }
}
