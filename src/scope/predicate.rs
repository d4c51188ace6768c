// ============================================================================
// Row Predicates
// ============================================================================
//
// A small filter algebra shared by every storage engine. The in-memory engine
// evaluates it directly against rows; the SQL engine renders it to a WHERE
// clause. Evaluation follows SQL three-valued logic: a comparison involving
// NULL is unknown, and only rows whose predicate is definitely true match.
//
// ============================================================================

use std::fmt;
use crate::core::{ArchiveError, Key, Result, Row, Schema, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches no row.
    Nothing,
    /// Matches every row.
    Everything,
    Eq { column: String, value: Value },
    Lt { column: String, value: Value },
    In { column: String, values: Vec<Value> },
    IsNull(String),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lt {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `column IN (keys)`; an empty key list yields [`Predicate::Nothing`].
    pub fn key_in(column: impl Into<String>, keys: &[Key]) -> Self {
        if keys.is_empty() {
            return Predicate::Nothing;
        }
        Predicate::In {
            column: column.into(),
            values: keys.iter().map(Value::from).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull(column.into())
    }

    pub fn negate(self) -> Self {
        match self {
            Predicate::Nothing => Predicate::Everything,
            Predicate::Everything => Predicate::Nothing,
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Nothing, p) | (p, Predicate::Nothing) => p,
            (Predicate::Everything, _) | (_, Predicate::Everything) => Predicate::Everything,
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Everything, p) | (p, Predicate::Everything) => p,
            (Predicate::Nothing, _) | (_, Predicate::Nothing) => Predicate::Nothing,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    /// True when the predicate can be decided without looking at rows and
    /// matches nothing.
    pub fn is_nothing(&self) -> bool {
        match self {
            Predicate::Nothing => true,
            Predicate::In { values, .. } => values.is_empty(),
            _ => false,
        }
    }

    /// Every column the predicate reads, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Nothing | Predicate::Everything => {}
            Predicate::Eq { column, .. }
            | Predicate::Lt { column, .. }
            | Predicate::In { column, .. }
            | Predicate::IsNull(column) => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_columns(out);
                }
            }
        }
    }

    /// Evaluate against a row of `table`.
    pub fn matches(&self, row: &Row, schema: &Schema, table: &str) -> Result<bool> {
        Ok(self.evaluate(row, schema, table)? == Some(true))
    }

    fn evaluate(&self, row: &Row, schema: &Schema, table: &str) -> Result<Option<bool>> {
        let lookup = |column: &str| -> Result<&Value> {
            schema
                .find_column_index(column)
                .map(|idx| &row[idx])
                .ok_or_else(|| ArchiveError::ColumnNotFound(column.to_string(), table.to_string()))
        };

        match self {
            Predicate::Nothing => Ok(Some(false)),
            Predicate::Everything => Ok(Some(true)),
            Predicate::Eq { column, value } => {
                let left = lookup(column)?;
                if left.is_null() || value.is_null() {
                    return Ok(None);
                }
                Ok(Some(left == value))
            }
            Predicate::Lt { column, value } => {
                let left = lookup(column)?;
                if left.is_null() || value.is_null() {
                    return Ok(None);
                }
                Ok(Some(left.compare(value)?.is_lt()))
            }
            Predicate::In { column, values } => {
                let left = lookup(column)?;
                if left.is_null() {
                    return Ok(None);
                }
                let mut saw_null = false;
                for candidate in values {
                    if candidate.is_null() {
                        saw_null = true;
                    } else if left == candidate {
                        return Ok(Some(true));
                    }
                }
                Ok(if saw_null { None } else { Some(false) })
            }
            Predicate::IsNull(column) => Ok(Some(lookup(column)?.is_null())),
            Predicate::Not(inner) => Ok(inner.evaluate(row, schema, table)?.map(|b| !b)),
            Predicate::And(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(row, schema, table)? {
                        Some(false) => return Ok(Some(false)),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                Ok(if unknown { None } else { Some(true) })
            }
            Predicate::Or(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(row, schema, table)? {
                        Some(true) => return Ok(Some(true)),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                Ok(if unknown { None } else { Some(false) })
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Nothing => write!(f, "FALSE"),
            Predicate::Everything => write!(f, "TRUE"),
            Predicate::Eq { column, value } => write!(f, "{} = {}", column, value),
            Predicate::Lt { column, value } => write!(f, "{} < {}", column, value),
            Predicate::In { column, values } => write!(f, "{} IN ({} values)", column, values.len()),
            Predicate::IsNull(column) => write!(f, "{} IS NULL", column),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
            Predicate::And(parts) => write_joined(f, parts, " AND "),
            Predicate::Or(parts) => write_joined(f, parts, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "({})", part)?;
    }
    Ok(())
}
