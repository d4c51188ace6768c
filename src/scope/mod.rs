pub mod predicate;

pub use predicate::Predicate;

use chrono::{DateTime, Utc};
use crate::config::{ArchiveConfig, DEFAULT_EXPIRATION_COLUMN};
use crate::graph::DependencyGraph;

/// A row filter bound to the entity it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub entity: String,
    pub predicate: Predicate,
}

impl Selection {
    pub fn new(entity: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            entity: entity.into(),
            predicate,
        }
    }

    /// Selection matching no rows of `entity`.
    pub fn none(entity: impl Into<String>) -> Self {
        Self::new(entity, Predicate::Nothing)
    }

    pub fn all(entity: impl Into<String>) -> Self {
        Self::new(entity, Predicate::Everything)
    }
}

/// Turns a caller's selection into the predicate the cascade actually runs.
pub struct ScopeResolver<'a> {
    graph: &'a DependencyGraph,
    default_expiration_column: &'a str,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self {
            graph,
            default_expiration_column: DEFAULT_EXPIRATION_COLUMN,
        }
    }

    /// Resolver falling back to the config's expiration column for entities
    /// the graph says nothing about.
    pub fn with_config(graph: &'a DependencyGraph, config: &'a ArchiveConfig) -> Self {
        Self {
            graph,
            default_expiration_column: &config.default_expiration_column,
        }
    }

    /// `explicit OR expiration_column < archive_date`.
    ///
    /// Without an archive date the explicit predicate is returned unchanged;
    /// with neither the result matches nothing. The returned predicate is
    /// always evaluated unscoped: engines must not add default row filters.
    pub fn resolve(
        &self,
        entity: &str,
        explicit: Option<Predicate>,
        archive_date: Option<DateTime<Utc>>,
    ) -> Predicate {
        let explicit = explicit.unwrap_or(Predicate::Nothing);
        match archive_date {
            Some(date) => {
                let column = self.graph.expiration_column_or(entity, self.default_expiration_column);
                explicit.or(Predicate::lt(column, date))
            }
            None => explicit,
        }
    }

    pub fn resolve_selection(
        &self,
        selection: Selection,
        archive_date: Option<DateTime<Utc>>,
    ) -> Selection {
        let predicate = self.resolve(&selection.entity, Some(selection.predicate), archive_date);
        Selection::new(selection.entity, predicate)
    }
}
