// ============================================================================
// SQL Rendering
// ============================================================================
//
// Renders the storage operations the cascade needs into parameterized
// PostgreSQL. Identifiers are validated and double-quoted; every value goes
// through a `$n` placeholder with an explicit cast so the server never has to
// infer parameter types. NULL is the only literal ever inlined.
//
// ============================================================================

use chrono::NaiveDateTime;
use crate::core::{Key, Result, Value, validate_identifier};
use crate::scope::Predicate;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    /// UTC wall-clock time, compared against `timestamp` columns holding UTC
    Timestamp(NaiveDateTime),
}

impl SqlParam {
    fn cast(&self) -> &'static str {
        match self {
            SqlParam::Integer(_) => "bigint",
            SqlParam::Float(_) => "float8",
            SqlParam::Text(_) => "text",
            SqlParam::Boolean(_) => "boolean",
            SqlParam::Timestamp(_) => "timestamp",
        }
    }

    /// Convert to a reference usable as a `tokio_postgres` query parameter.
    #[cfg(feature = "postgres")]
    pub fn as_to_sql(&self) -> &(dyn tokio_postgres::types::ToSql + Sync) {
        match self {
            SqlParam::Integer(v) => v,
            SqlParam::Float(v) => v,
            SqlParam::Text(v) => v,
            SqlParam::Boolean(v) => v,
            SqlParam::Timestamp(v) => v,
        }
    }
}

/// SQL text plus its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

#[derive(Default)]
struct Builder {
    sql: String,
    params: Vec<SqlParam>,
}

impl Builder {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn push_value(&mut self, value: &Value) {
        let param = match value {
            Value::Null => {
                self.sql.push_str("NULL");
                return;
            }
            Value::Integer(v) => SqlParam::Integer(*v),
            Value::Float(v) => SqlParam::Float(*v),
            Value::Text(v) => SqlParam::Text(v.clone()),
            Value::Boolean(v) => SqlParam::Boolean(*v),
            Value::Timestamp(v) => SqlParam::Timestamp(v.naive_utc()),
        };
        let placeholder = format!("${}::{}", self.params.len() + 1, param.cast());
        self.sql.push_str(&placeholder);
        self.params.push(param);
    }

    fn push_predicate(&mut self, predicate: &Predicate) -> Result<()> {
        match predicate {
            Predicate::Nothing => self.push("FALSE"),
            Predicate::Everything => self.push("TRUE"),
            Predicate::Eq { column, value } => {
                self.push(&quote_ident(column)?);
                self.push(" = ");
                self.push_value(value);
            }
            Predicate::Lt { column, value } => {
                self.push(&quote_ident(column)?);
                self.push(" < ");
                self.push_value(value);
            }
            Predicate::In { values, .. } if values.is_empty() => self.push("FALSE"),
            Predicate::In { column, values } => {
                self.push(&quote_ident(column)?);
                self.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push_value(value);
                }
                self.push(")");
            }
            Predicate::IsNull(column) => {
                self.push(&quote_ident(column)?);
                self.push(" IS NULL");
            }
            Predicate::Not(inner) => {
                self.push("NOT (");
                self.push_predicate(inner)?;
                self.push(")");
            }
            Predicate::And(parts) => self.push_joined(parts, " AND ", "TRUE")?,
            Predicate::Or(parts) => self.push_joined(parts, " OR ", "FALSE")?,
        }
        Ok(())
    }

    fn push_joined(&mut self, parts: &[Predicate], sep: &str, empty: &str) -> Result<()> {
        if parts.is_empty() {
            self.push(empty);
            return Ok(());
        }
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            self.push("(");
            self.push_predicate(part)?;
            self.push(")");
        }
        Ok(())
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Validate and double-quote an identifier.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name))
}

fn quote_list(columns: &[String]) -> Result<String> {
    Ok(columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// Render a predicate on its own, as used in a WHERE clause.
pub fn where_clause(predicate: &Predicate) -> Result<Statement> {
    let mut builder = Builder::default();
    builder.push_predicate(predicate)?;
    Ok(builder.finish())
}

/// Column names of `table` in ordinal order.
pub fn columns(table: &str) -> Result<Statement> {
    validate_identifier(table)?;
    Ok(Statement {
        sql: "SELECT column_name::text FROM information_schema.columns \
              WHERE table_schema = current_schema() AND table_name = $1::text \
              ORDER BY ordinal_position"
            .to_string(),
        params: vec![SqlParam::Text(table.to_string())],
    })
}

pub fn count(table: &str, predicate: &Predicate) -> Result<Statement> {
    let mut builder = Builder::default();
    builder.push(&format!("SELECT COUNT(*) FROM {} WHERE ", quote_ident(table)?));
    builder.push_predicate(predicate)?;
    Ok(builder.finish())
}

/// Keyset page: keys greater than `after`, ascending, at most `limit`.
pub fn select_keys(
    table: &str,
    key_column: &str,
    predicate: &Predicate,
    after: Option<&Key>,
    limit: usize,
) -> Result<Statement> {
    let key = quote_ident(key_column)?;
    let mut builder = Builder::default();
    builder.push(&format!("SELECT {} FROM {} WHERE (", key, quote_ident(table)?));
    builder.push_predicate(predicate)?;
    builder.push(")");
    if let Some(after) = after {
        builder.push(&format!(" AND {} > ", key));
        builder.push_value(&Value::from(after));
    }
    builder.push(&format!(" ORDER BY {} LIMIT {}", key, limit));
    Ok(builder.finish())
}

/// `INSERT INTO to (cols) SELECT cols FROM from WHERE predicate`.
pub fn copy_rows(from: &str, to: &str, columns: &[String], predicate: &Predicate) -> Result<Statement> {
    let list = quote_list(columns)?;
    let mut builder = Builder::default();
    builder.push(&format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} WHERE ",
        quote_ident(to)?,
        list,
        list,
        quote_ident(from)?
    ));
    builder.push_predicate(predicate)?;
    Ok(builder.finish())
}

pub fn delete_rows(table: &str, key_column: &str, keys: &[Key]) -> Result<Statement> {
    let mut builder = Builder::default();
    builder.push(&format!("DELETE FROM {} WHERE ", quote_ident(table)?));
    builder.push_predicate(&Predicate::key_in(key_column, keys))?;
    Ok(builder.finish())
}
