// ============================================================================
// cascade_archive Library
// ============================================================================
//
// Moves expired rows, and every row that depends on them, from live tables
// into `<table>_archive` tables, and brings them back on request.
//
// ============================================================================

pub mod core;
pub mod config;
pub mod graph;
pub mod scope;
pub mod cursor;
pub mod storage;
pub mod transaction;
pub mod cascade;

// Re-export main types for convenience
pub use cascade::{Cascade, CascadeArchiver, CascadeRestorer};
pub use config::ArchiveConfig;
pub use core::{ArchiveError, DataType, Key, Result, Value};
pub use cursor::{Batch, BatchCursor};
pub use graph::DependencyGraph;
pub use scope::{Predicate, ScopeResolver, Selection};
pub use storage::{InMemoryStorage, StorageEngine};
#[cfg(feature = "postgres")]
pub use storage::PostgresStorage;

use chrono::{DateTime, Utc};

/// Archive every `root` row whose expiration column is older than
/// `archive_date`, children first, using the default [`ArchiveConfig`].
///
/// # Examples
///
/// ```
/// use cascade_archive::{DependencyGraph, InMemoryStorage};
/// use cascade_archive::core::{Column, DataType};
/// use cascade_archive::storage::TableSchema;
/// use chrono::{Duration, Utc};
///
/// # #[tokio::main]
/// # async fn main() -> cascade_archive::Result<()> {
/// let storage = InMemoryStorage::new();
/// storage
///     .create_table(TableSchema::new(
///         "boards",
///         vec![
///             Column::new("id", DataType::Integer).primary_key(),
///             Column::new("created_at", DataType::Timestamp),
///         ],
///     ))
///     .await?;
/// storage.create_table_like("boards", "boards_archive").await?;
/// storage
///     .insert("boards", vec![1i64.into(), (Utc::now() - Duration::days(3)).into()])
///     .await?;
///
/// let graph = DependencyGraph::empty();
/// cascade_archive::archive(&storage, "boards", Utc::now() - Duration::days(1), &graph).await?;
/// assert_eq!(storage.row_count("boards_archive").await?, 1);
/// # Ok(())
/// # }
/// ```
pub async fn archive<S: StorageEngine>(
    storage: &S,
    root: &str,
    archive_date: DateTime<Utc>,
    graph: &DependencyGraph,
) -> Result<()> {
    let config = ArchiveConfig::default();
    CascadeArchiver::new(storage, graph, &config)
        .archive(Selection::none(root), Some(archive_date))
        .await
}

/// Archive exactly the rows of `selection` and their dependents.
pub async fn archive_scope<S: StorageEngine>(
    storage: &S,
    selection: Selection,
    graph: &DependencyGraph,
) -> Result<()> {
    let config = ArchiveConfig::default();
    CascadeArchiver::new(storage, graph, &config)
        .archive(selection, None)
        .await
}

/// Restore the archived rows of `selection` and their archived dependents.
pub async fn restore_scope<S: StorageEngine>(
    storage: &S,
    selection: Selection,
    graph: &DependencyGraph,
) -> Result<()> {
    let config = ArchiveConfig::default();
    CascadeRestorer::new(storage, graph, &config)
        .restore(selection)
        .await
}
