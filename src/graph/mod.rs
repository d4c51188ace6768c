// ============================================================================
// Dependency Graph
// ============================================================================
//
// Passive description of which tables hang off which: per entity, its ordered
// children, the column children use to reference it, the column that decides
// expiration and its primary key. Built once, validated once (identifiers,
// acyclicity), then only read while a cascade runs.
//
// ============================================================================

pub mod definition;

pub use definition::{EntityDefinition, GraphDefinition};

use std::collections::{BTreeMap, HashMap};
use crate::config::{DEFAULT_EXPIRATION_COLUMN, DEFAULT_PRIMARY_KEY};
use crate::core::{ArchiveError, Result, validate_identifier};

/// An edge from a parent entity to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLink<'a> {
    pub entity: &'a str,
    /// Column of the child table holding the parent's primary key.
    pub foreign_key: &'a str,
}

#[derive(Debug, Clone, Default)]
struct Node {
    children: Vec<String>,
    foreign_key: String,
    expiration_column: Option<String>,
    primary_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<String, Node>,
    default_expiration_column: Option<String>,
    default_primary_key: Option<String>,
}

impl DependencyGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// A graph with no declared dependencies: every entity is a leaf.
    pub fn empty() -> Self {
        Self {
            nodes: HashMap::new(),
            default_expiration_column: None,
            default_primary_key: None,
        }
    }

    pub fn children_of(&self, entity: &str) -> Vec<ChildLink<'_>> {
        let Some(node) = self.nodes.get(entity) else {
            return Vec::new();
        };
        node.children
            .iter()
            .map(|child| ChildLink {
                entity: child,
                foreign_key: &node.foreign_key,
            })
            .collect()
    }

    pub fn expiration_column_of(&self, entity: &str) -> &str {
        self.expiration_column_or(entity, DEFAULT_EXPIRATION_COLUMN)
    }

    /// Like [`expiration_column_of`](Self::expiration_column_of), but with
    /// `fallback` when neither the entity nor the graph names a column.
    pub fn expiration_column_or<'a>(&'a self, entity: &str, fallback: &'a str) -> &'a str {
        self.nodes
            .get(entity)
            .and_then(|node| node.expiration_column.as_deref())
            .or(self.default_expiration_column.as_deref())
            .unwrap_or(fallback)
    }

    /// Column children use to reference `entity`; `<singular entity>_id`
    /// unless overridden.
    pub fn foreign_key_for(&self, entity: &str) -> String {
        match self.nodes.get(entity) {
            Some(node) => node.foreign_key.clone(),
            None => default_foreign_key(entity),
        }
    }

    pub fn primary_key_of(&self, entity: &str) -> &str {
        self.primary_key_or(entity, DEFAULT_PRIMARY_KEY)
    }

    pub fn primary_key_or<'a>(&'a self, entity: &str, fallback: &'a str) -> &'a str {
        self.nodes
            .get(entity)
            .and_then(|node| node.primary_key.as_deref())
            .or(self.default_primary_key.as_deref())
            .unwrap_or(fallback)
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.nodes.contains_key(entity)
    }
}

/// Entity configuration collected by [`GraphBuilder::entity`].
#[derive(Debug, Clone, Default)]
pub struct EntityBuilder {
    children: Vec<String>,
    foreign_key: Option<String>,
    expiration_column: Option<String>,
    primary_key: Option<String>,
}

impl EntityBuilder {
    pub fn child(mut self, entity: impl Into<String>) -> Self {
        self.children.push(entity.into());
        self
    }

    pub fn children<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children.extend(entities.into_iter().map(Into::into));
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn expiration_column(mut self, column: impl Into<String>) -> Self {
        self.expiration_column = Some(column.into());
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    entities: BTreeMap<String, EntityBuilder>,
    default_expiration_column: Option<String>,
    default_primary_key: Option<String>,
}

impl GraphBuilder {
    /// Declare (or extend) an entity.
    pub fn entity<F>(mut self, name: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(EntityBuilder) -> EntityBuilder,
    {
        let name = name.into();
        let current = self.entities.remove(&name).unwrap_or_default();
        self.entities.insert(name, configure(current));
        self
    }

    pub fn default_expiration_column(mut self, column: impl Into<String>) -> Self {
        self.default_expiration_column = Some(column.into());
        self
    }

    pub fn default_primary_key(mut self, column: impl Into<String>) -> Self {
        self.default_primary_key = Some(column.into());
        self
    }

    pub fn build(self) -> Result<DependencyGraph> {
        for column in [&self.default_expiration_column, &self.default_primary_key]
            .into_iter()
            .flatten()
        {
            validate_identifier(column)?;
        }

        let mut nodes: HashMap<String, Node> = HashMap::new();
        for (name, spec) in self.entities {
            validate_identifier(&name)?;
            let mut children: Vec<String> = Vec::with_capacity(spec.children.len());
            for child in spec.children {
                validate_identifier(&child)?;
                if !children.contains(&child) {
                    children.push(child);
                }
            }
            for column in [&spec.foreign_key, &spec.expiration_column, &spec.primary_key]
                .into_iter()
                .flatten()
            {
                validate_identifier(column)?;
            }

            let foreign_key = spec
                .foreign_key
                .unwrap_or_else(|| default_foreign_key(&name));
            nodes.insert(
                name,
                Node {
                    children,
                    foreign_key,
                    expiration_column: spec.expiration_column,
                    primary_key: spec.primary_key,
                },
            );
        }

        // Entities named only as children become leaves with default settings
        let leaves: Vec<String> = nodes
            .values()
            .flat_map(|node| node.children.iter())
            .filter(|child| !nodes.contains_key(child.as_str()))
            .cloned()
            .collect();
        for leaf in leaves {
            let foreign_key = default_foreign_key(&leaf);
            nodes.entry(leaf).or_insert_with(|| Node {
                foreign_key,
                ..Node::default()
            });
        }

        let graph = DependencyGraph {
            nodes,
            default_expiration_column: self.default_expiration_column,
            default_primary_key: self.default_primary_key,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl DependencyGraph {
    fn check_acyclic(&self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();

        // Sorted roots keep the reported cycle deterministic
        let mut roots: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        roots.sort_unstable();

        for root in roots {
            self.visit(root, &mut marks, &mut path)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        entity: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        match marks.get(entity) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = path.iter().position(|e| *e == entity).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(entity);
                return Err(ArchiveError::CyclicDependency(cycle.join(" -> ")));
            }
            None => {}
        }

        marks.insert(entity, Mark::InProgress);
        path.push(entity);
        if let Some(node) = self.nodes.get(entity) {
            for child in &node.children {
                self.visit(child, marks, path)?;
            }
        }
        path.pop();
        marks.insert(entity, Mark::Done);
        Ok(())
    }
}

/// `boards` -> `board_id`, `categories` -> `category_id`, `board` -> `board_id`.
pub fn default_foreign_key(entity: &str) -> String {
    format!("{}_id", singularize(entity))
}

fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies")
        && !stem.is_empty()
    {
        return format!("{stem}y");
    }
    for suffix in ["sses", "xes", "ches", "shes"] {
        if name.ends_with(suffix) {
            return name[..name.len() - 2].to_string();
        }
    }
    if name.ends_with("ss") {
        return name.to_string();
    }
    match name.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}
