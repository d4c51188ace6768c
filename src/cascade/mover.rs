use tracing::{Level, event};
use crate::core::{ArchiveError, EntityType, Result};
use crate::cursor::Batch;
use crate::storage::StorageEngine;

/// Column list shared by a live table and its archive counterpart.
pub(crate) async fn mirrored_columns<S: StorageEngine>(
    storage: &S,
    live: &str,
    archive: &str,
) -> Result<Vec<String>> {
    let live_type = EntityType::new(live, storage.columns(live).await?);
    let archive_type = EntityType::new(archive, storage.columns(archive).await?);
    if !live_type.mirrors(&archive_type) {
        return Err(ArchiveError::SchemaMismatch {
            table: live.to_string(),
            archive: archive.to_string(),
        });
    }
    Ok(live_type.columns().to_vec())
}

/// Copy the batch's rows from `from` into `to`, then delete them from
/// `from`, in one transaction. Returns the number of rows moved.
///
/// Rows of the batch that disappeared since it was paged are skipped by both
/// statements; any other disagreement between the two counts aborts the move.
pub(crate) async fn move_batch<S: StorageEngine>(
    storage: &S,
    from: &str,
    to: &str,
    columns: &[String],
    key_column: &str,
    batch: &Batch,
) -> Result<usize> {
    let predicate = batch.predicate(key_column);
    let mut tx = storage.begin().await?;

    let outcome = async {
        let inserted = storage.copy_rows(&mut tx, from, to, columns, &predicate).await?;
        let deleted = storage.delete_rows(&mut tx, from, key_column, batch.keys()).await?;
        if inserted != deleted {
            return Err(ArchiveError::MoveMismatch {
                from: from.to_string(),
                to: to.to_string(),
                expected: inserted,
                actual: deleted,
            });
        }
        Ok::<_, ArchiveError>(inserted)
    }
    .await;

    match outcome {
        Ok(moved) => {
            storage.commit(tx).await?;
            event!(Level::DEBUG, from, to, rows = moved, "batch moved");
            Ok(moved)
        }
        Err(err) => {
            event!(Level::WARN, from, to, error = %err, "batch move failed, rolling back");
            if let Err(rollback_err) = storage.rollback(tx).await {
                event!(Level::ERROR, error = %rollback_err, "rollback after failed move failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, Key, Value};
    use crate::storage::{InMemoryStorage, TableSchema};

    async fn storage() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        storage
            .create_table(TableSchema::new(
                "cards",
                vec![
                    Column::new("id", DataType::Integer).primary_key(),
                    Column::new("title", DataType::Text),
                ],
            ))
            .await
            .unwrap();
        storage.create_table_like("cards", "cards_archive").await.unwrap();
        for id in 1..=3 {
            storage
                .insert("cards", vec![Value::Integer(id), Value::from(format!("card {}", id))])
                .await
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_move_batch_moves_only_batch_keys() {
        let storage = storage().await;
        let columns = mirrored_columns(&storage, "cards", "cards_archive").await.unwrap();
        let batch = Batch::new(vec![Key::Integer(1), Key::Integer(3)]).unwrap();

        let moved = move_batch(&storage, "cards", "cards_archive", &columns, "id", &batch).await.unwrap();
        assert_eq!(moved, 2);
        assert_eq!(storage.row_count("cards").await.unwrap(), 1);
        assert_eq!(
            storage.get_row("cards_archive", &Key::Integer(3)).await.unwrap(),
            Some(vec![Value::Integer(3), Value::from("card 3")])
        );
    }

    #[tokio::test]
    async fn test_failed_move_leaves_live_rows() {
        let storage = storage().await;
        storage
            .insert("cards_archive", vec![Value::Integer(2), Value::from("stale")])
            .await
            .unwrap();
        let columns = mirrored_columns(&storage, "cards", "cards_archive").await.unwrap();
        let batch = Batch::new(vec![Key::Integer(1), Key::Integer(2)]).unwrap();

        let err = move_batch(&storage, "cards", "cards_archive", &columns, "id", &batch).await.unwrap_err();
        assert!(matches!(err, ArchiveError::ConstraintViolation(_)));
        assert_eq!(storage.row_count("cards").await.unwrap(), 3);
        assert_eq!(storage.row_count("cards_archive").await.unwrap(), 1);
        assert_eq!(storage.transaction_stats().await.active, 0);
    }

    #[tokio::test]
    async fn test_schema_mismatch_detected() {
        let storage = storage().await;
        storage
            .create_table(TableSchema::new(
                "tags_archive",
                vec![Column::new("id", DataType::Integer).primary_key()],
            ))
            .await
            .unwrap();
        let err = mirrored_columns(&storage, "cards", "tags_archive").await.unwrap_err();
        assert!(matches!(err, ArchiveError::SchemaMismatch { .. }));
    }
}
