use super::StorageEngine;
use super::sql::{self, Statement};
use crate::core::{ArchiveError, Key, Result};
use crate::scope::Predicate;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::{Client, Row};

/// PostgreSQL engine over a caller-supplied connection.
///
/// A transaction holds the connection exclusively from `BEGIN` until
/// `COMMIT` or `ROLLBACK`, so reads issued while one is open wait for it.
/// A transaction dropped before either (a cancelled batch future) is rolled
/// back the next time the connection is used through this storage.
#[derive(Clone)]
pub struct PostgresStorage {
    client: Arc<Mutex<Client>>,
    abandoned: AbandonFlag,
}

/// Exclusive use of the connection inside `BEGIN` .. `COMMIT`.
pub struct PgTransaction {
    conn: OwnedMutexGuard<Client>,
    guard: AbandonGuard,
}

/// Raised when a transaction handle is dropped before the server saw its
/// `COMMIT` or `ROLLBACK`.
#[derive(Clone, Default)]
struct AbandonFlag(Arc<AtomicBool>);

impl AbandonFlag {
    fn guard(&self) -> AbandonGuard {
        AbandonGuard {
            flag: self.clone(),
            finished: false,
        }
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

struct AbandonGuard {
    flag: AbandonFlag,
    finished: bool,
}

impl AbandonGuard {
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.flag.0.store(true, Ordering::SeqCst);
        }
    }
}

impl PostgresStorage {
    pub fn new(client: Client) -> Self {
        Self::from_shared(Arc::new(Mutex::new(client)))
    }

    pub fn from_shared(client: Arc<Mutex<Client>>) -> Self {
        Self {
            client,
            abandoned: AbandonFlag::default(),
        }
    }

    /// Close a transaction a dropped [`PgTransaction`] left open. Must be
    /// called with the connection locked.
    async fn settle(&self, conn: &Client) -> Result<()> {
        if self.abandoned.take() {
            warn!("Rolling back abandoned PostgreSQL transaction");
            if let Err(err) = conn.batch_execute("ROLLBACK").await {
                self.abandoned.0.store(true, Ordering::SeqCst);
                return Err(err.into());
            }
        }
        Ok(())
    }

    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>> {
        let conn = self.client.lock().await;
        self.settle(&conn).await?;
        let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
            stmt.params.iter().map(|p| p.as_to_sql()).collect();
        Ok(conn.query(&stmt.sql, &params[..]).await?)
    }
}

async fn execute(conn: &Client, stmt: &Statement) -> Result<usize> {
    let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
        stmt.params.iter().map(|p| p.as_to_sql()).collect();
    let affected = conn.execute(&stmt.sql, &params[..]).await?;
    Ok(affected as usize)
}

fn key_from_row(row: &Row) -> Result<Key> {
    if let Ok(v) = row.try_get::<_, i64>(0) {
        return Ok(Key::Integer(v));
    }
    if let Ok(v) = row.try_get::<_, i32>(0) {
        return Ok(Key::Integer(v as i64));
    }
    if let Ok(v) = row.try_get::<_, String>(0) {
        return Ok(Key::Text(v));
    }
    Err(ArchiveError::TypeMismatch(format!(
        "unsupported primary key type {}",
        row.columns()[0].type_()
    )))
}

#[async_trait]
impl StorageEngine for PostgresStorage {
    type Transaction = PgTransaction;

    async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = self.query(&sql::columns(table)?).await?;
        if rows.is_empty() {
            return Err(ArchiveError::TableNotFound(table.to_string()));
        }
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn count(&self, table: &str, predicate: &Predicate) -> Result<usize> {
        let rows = self.query(&sql::count(table, predicate)?).await?;
        let count: i64 = rows.first().map(|row| row.get(0)).unwrap_or(0);
        Ok(count as usize)
    }

    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        predicate: &Predicate,
        after: Option<&Key>,
        limit: usize,
    ) -> Result<Vec<Key>> {
        let stmt = sql::select_keys(table, key_column, predicate, after, limit)?;
        self.query(&stmt).await?.iter().map(key_from_row).collect()
    }

    async fn begin(&self) -> Result<PgTransaction> {
        let conn = self.client.clone().lock_owned().await;
        self.settle(&conn).await?;
        // Guarded before BEGIN is sent, so a cancelled begin is rolled back too
        let tx = PgTransaction {
            conn,
            guard: self.abandoned.guard(),
        };
        tx.conn.batch_execute("BEGIN").await?;
        Ok(tx)
    }

    async fn copy_rows(
        &self,
        tx: &mut PgTransaction,
        from: &str,
        to: &str,
        columns: &[String],
        predicate: &Predicate,
    ) -> Result<usize> {
        if predicate.is_nothing() {
            return Ok(0);
        }
        execute(&tx.conn, &sql::copy_rows(from, to, columns, predicate)?).await
    }

    async fn delete_rows(
        &self,
        tx: &mut PgTransaction,
        table: &str,
        key_column: &str,
        keys: &[Key],
    ) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        execute(&tx.conn, &sql::delete_rows(table, key_column, keys)?).await
    }

    async fn commit(&self, mut tx: PgTransaction) -> Result<()> {
        if let Err(err) = tx.conn.batch_execute("COMMIT").await {
            warn!("COMMIT failed: {}", err);
            return Err(err.into());
        }
        tx.guard.finish();
        debug!("Committed PostgreSQL transaction");
        Ok(())
    }

    async fn rollback(&self, mut tx: PgTransaction) -> Result<()> {
        tx.conn.batch_execute("ROLLBACK").await?;
        tx.guard.finish();
        debug!("Rolled back PostgreSQL transaction");
        Ok(())
    }
}
