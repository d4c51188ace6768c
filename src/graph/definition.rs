//! Declarative graph definitions, typically kept next to the application's
//! other configuration:
//!
//! ```json
//! {
//!   "default_expiration_column": "created_at",
//!   "entities": {
//!     "boards": { "children": ["cards"], "expiration_column": "published_at" },
//!     "cards":  { "children": ["tags"] }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Deserialize, Serialize};
use super::{DependencyGraph, GraphBuilder};
use crate::core::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expiration_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_primary_key: Option<String>,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDefinition>,
}

impl GraphDefinition {
    pub fn into_builder(self) -> GraphBuilder {
        let mut builder = DependencyGraph::builder();
        if let Some(column) = self.default_expiration_column {
            builder = builder.default_expiration_column(column);
        }
        if let Some(column) = self.default_primary_key {
            builder = builder.default_primary_key(column);
        }
        for (name, def) in self.entities {
            builder = builder.entity(name, |mut e| {
                e = e.children(def.children);
                if let Some(fk) = def.foreign_key {
                    e = e.foreign_key(fk);
                }
                if let Some(column) = def.expiration_column {
                    e = e.expiration_column(column);
                }
                if let Some(pk) = def.primary_key {
                    e = e.primary_key(pk);
                }
                e
            });
        }
        builder
    }
}

impl DependencyGraph {
    pub fn from_definition(definition: GraphDefinition) -> Result<Self> {
        definition.into_builder().build()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let definition: GraphDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArchiveError;
    use std::io::Write;

    const BOARDS: &str = r#"{
        "entities": {
            "boards": { "children": ["cards"], "expiration_column": "published_at" },
            "cards": { "children": ["tags"], "foreign_key": "parent_card" }
        }
    }"#;

    #[test]
    fn test_from_json() {
        let graph = DependencyGraph::from_json(BOARDS).unwrap();
        assert_eq!(graph.expiration_column_of("boards"), "published_at");
        assert_eq!(graph.children_of("boards")[0].entity, "cards");
        assert_eq!(graph.children_of("cards")[0].foreign_key, "parent_card");
        assert!(graph.children_of("tags").is_empty());
    }

    #[test]
    fn test_from_json_rejects_cycles() {
        let json = r#"{ "entities": { "a": { "children": ["b"] }, "b": { "children": ["a"] } } }"#;
        assert!(matches!(
            DependencyGraph::from_json(json),
            Err(ArchiveError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            DependencyGraph::from_json("{ entities: "),
            Err(ArchiveError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BOARDS.as_bytes()).unwrap();
        let graph = DependencyGraph::from_path(file.path()).unwrap();
        assert!(graph.contains("cards"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            DependencyGraph::from_path("/nonexistent/graph.json"),
            Err(ArchiveError::Io(_))
        ));
    }
}
