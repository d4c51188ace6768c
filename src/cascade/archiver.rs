use async_recursion::async_recursion;
use chrono::{DateTime, Utc};
use tracing::{Instrument, Level, event, info_span};
use super::mover::{mirrored_columns, move_batch};
use crate::config::ArchiveConfig;
use crate::core::Result;
use crate::cursor::BatchCursor;
use crate::graph::DependencyGraph;
use crate::scope::{ScopeResolver, Selection};
use crate::storage::StorageEngine;

/// Moves a selection and everything that depends on it into archive
/// tables, children before parents.
pub struct CascadeArchiver<'a, S: StorageEngine> {
    storage: &'a S,
    graph: &'a DependencyGraph,
    config: &'a ArchiveConfig,
}

impl<'a, S: StorageEngine> CascadeArchiver<'a, S> {
    pub fn new(storage: &'a S, graph: &'a DependencyGraph, config: &'a ArchiveConfig) -> Self {
        Self { storage, graph, config }
    }

    /// Archive `selection`, widened by `expiration_column < archive_date`
    /// when a date is given.
    ///
    /// The expiration filter only applies to the root entity; dependents are
    /// selected purely by their reference to an archived parent.
    pub async fn archive(&self, selection: Selection, archive_date: Option<DateTime<Utc>>) -> Result<()> {
        let root = selection.entity.clone();
        let selection =
            ScopeResolver::with_config(self.graph, self.config).resolve_selection(selection, archive_date);
        let moved = self.archive_node(selection).await?;
        event!(Level::INFO, entity = %root, rows = moved, "archive finished");
        Ok(())
    }

    #[async_recursion]
    async fn archive_node(&self, selection: Selection) -> Result<usize> {
        let span = info_span!("cascade.archive", entity = %selection.entity);
        async move {
            let live = selection.entity.as_str();
            let archive = self.config.archive_table(live);
            let key_column = self.graph.primary_key_or(live, &self.config.default_primary_key);
            let children = self.graph.children_of(live);

            let mut cursor = BatchCursor::new(
                self.storage,
                live,
                key_column,
                selection.predicate.clone(),
                self.config.batch_size,
            );
            let mut columns: Option<Vec<String>> = None;
            let mut moved = 0;

            while let Some(batch) = cursor.next_batch().await? {
                event!(Level::DEBUG, keys = batch.len(), "archiving batch");

                for child in &children {
                    let dependents = Selection::new(child.entity, batch.predicate(child.foreign_key));
                    moved += self.archive_node(dependents).await?;
                }

                if columns.is_none() {
                    columns = Some(mirrored_columns(self.storage, live, &archive).await?);
                }
                if let Some(columns) = &columns {
                    moved += move_batch(self.storage, live, &archive, columns, key_column, &batch).await?;
                }
            }

            Ok(moved)
        }
        .instrument(span)
        .await
    }
}
