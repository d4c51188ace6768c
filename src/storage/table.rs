use std::collections::BTreeMap;
use std::ops::Bound;
use crate::core::{ArchiveError, Column, ForeignKey, Key, Result, Row, Schema};
use crate::scope::Predicate;

#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    schema: Schema,
    foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(columns),
            foreign_keys: Vec::new(),
        }
    }

    /// Declare `column REFERENCES table(primary key)`.
    pub fn foreign_key(mut self, column: impl Into<String>, references: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKey::new(column, references));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Same columns under a new name, without constraints other than the
    /// primary key (`CREATE TABLE .. (LIKE ..)`).
    pub fn like(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: self.schema.clone(),
            foreign_keys: Vec::new(),
        }
    }
}

/// Committed rows of one table, ordered by primary key.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    key_index: usize,
    rows: BTreeMap<Key, Row>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Result<Self> {
        let key_index = schema.schema().primary_key_index().ok_or_else(|| {
            ArchiveError::ConstraintViolation(format!("Table '{}' has no primary key", schema.name()))
        })?;
        for fk in schema.foreign_keys() {
            if schema.schema().find_column_index(&fk.column).is_none() {
                return Err(ArchiveError::ColumnNotFound(fk.column.clone(), schema.name().to_string()));
            }
        }
        Ok(Self {
            schema,
            key_index,
            rows: BTreeMap::new(),
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn primary_key_column(&self) -> &str {
        &self.schema.schema().columns()[self.key_index].name
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.rows.contains_key(key)
    }

    pub fn get(&self, key: &Key) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&Key, &Row)> {
        self.rows.iter()
    }

    /// Validate a row and derive its key; does not check uniqueness.
    pub fn key_of(&self, row: &Row) -> Result<Key> {
        let columns = self.schema.schema().columns();
        if row.len() != columns.len() {
            return Err(ArchiveError::TypeMismatch(format!(
                "Table '{}' expects {} columns, got {}",
                self.name(),
                columns.len(),
                row.len()
            )));
        }
        for (column, value) in columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Key::try_from(&row[self.key_index])
    }

    pub fn insert(&mut self, row: Row) -> Result<Key> {
        let key = self.key_of(&row)?;
        if self.rows.contains_key(&key) {
            return Err(duplicate_key(self.name(), &key));
        }
        self.rows.insert(key.clone(), row);
        Ok(key)
    }

    pub fn remove(&mut self, key: &Key) -> Option<Row> {
        self.rows.remove(key)
    }

    /// Insert a row already validated by a transaction commit.
    pub(crate) fn apply_insert(&mut self, key: Key, row: Row) {
        self.rows.insert(key, row);
    }

    /// Fail if the predicate reads a column this table does not have.
    pub fn check_predicate(&self, predicate: &Predicate) -> Result<()> {
        for column in predicate.columns() {
            self.column_index(column)?;
        }
        Ok(())
    }

    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.schema
            .schema()
            .find_column_index(column)
            .ok_or_else(|| ArchiveError::ColumnNotFound(column.to_string(), self.name().to_string()))
    }

    pub fn matches(&self, row: &Row, predicate: &Predicate) -> Result<bool> {
        predicate.matches(row, self.schema.schema(), self.name())
    }

    /// Keys strictly after `after` whose rows match, ascending, at most `limit`.
    pub fn keys_after(&self, predicate: &Predicate, after: Option<&Key>, limit: usize) -> Result<Vec<Key>> {
        self.check_predicate(predicate)?;
        if predicate.is_nothing() || limit == 0 {
            return Ok(Vec::new());
        }

        let lower = match after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        let mut keys = Vec::new();
        for (key, row) in self.rows.range((lower, Bound::Unbounded)) {
            if self.matches(row, predicate)? {
                keys.push(key.clone());
                if keys.len() == limit {
                    break;
                }
            }
        }
        Ok(keys)
    }

    pub fn count_matching(&self, predicate: &Predicate) -> Result<usize> {
        self.check_predicate(predicate)?;
        let mut count = 0;
        for row in self.rows.values() {
            if self.matches(row, predicate)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

pub(crate) fn duplicate_key(table: &str, key: &Key) -> ArchiveError {
    ArchiveError::ConstraintViolation(format!(
        "duplicate key value {} violates primary key of '{}'",
        key, table
    ))
}
