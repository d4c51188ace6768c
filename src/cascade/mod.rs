// ============================================================================
// Cascade Engine
// ============================================================================
//
// Archive: depth-first over the dependency graph, each batch's dependents are
// archived before the batch itself, so no live row is ever left pointing at
// an archived parent. Restore walks the same graph the other way round.
//
// Atomicity is per batch only. A failure part-way through a cascade leaves
// the batches already moved where they are and propagates the error;
// re-running the same operation picks up whatever is left.
//
// ============================================================================

pub mod archiver;
pub mod restorer;
mod mover;

pub use archiver::CascadeArchiver;
pub use restorer::CascadeRestorer;

use chrono::{DateTime, Utc};
use crate::config::ArchiveConfig;
use crate::core::Result;
use crate::graph::DependencyGraph;
use crate::scope::Selection;
use crate::storage::StorageEngine;

/// A storage engine bundled with the configuration cascades run under.
pub struct Cascade<S: StorageEngine> {
    storage: S,
    config: ArchiveConfig,
}

impl<S: StorageEngine> Cascade<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: ArchiveConfig::default(),
        }
    }

    pub fn with_config(storage: S, config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { storage, config })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Archive every `root` row whose expiration column is older than
    /// `archive_date`, together with all of its dependents.
    pub async fn archive(&self, root: &str, archive_date: DateTime<Utc>, graph: &DependencyGraph) -> Result<()> {
        CascadeArchiver::new(&self.storage, graph, &self.config)
            .archive(Selection::none(root), Some(archive_date))
            .await
    }

    /// Archive exactly the rows of `selection`, together with their dependents.
    pub async fn archive_scope(&self, selection: Selection, graph: &DependencyGraph) -> Result<()> {
        CascadeArchiver::new(&self.storage, graph, &self.config)
            .archive(selection, None)
            .await
    }

    /// Restore the archived rows of `selection`, together with their
    /// archived dependents.
    pub async fn restore_scope(&self, selection: Selection, graph: &DependencyGraph) -> Result<()> {
        CascadeRestorer::new(&self.storage, graph, &self.config)
            .restore(selection)
            .await
    }
}
