#![allow(dead_code)]

use cascade_archive::core::{Column, DataType, Result, Value};
use cascade_archive::storage::TableSchema;
use cascade_archive::{DependencyGraph, InMemoryStorage, Key};
use chrono::{DateTime, Duration, Utc};

pub const TABLES: [&str; 6] = [
    "boards",
    "boards_archive",
    "cards",
    "cards_archive",
    "tags",
    "tags_archive",
];

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Archive cutoff used throughout: one day ago.
pub fn cutoff() -> DateTime<Utc> {
    days_ago(1)
}

/// boards -> cards -> tags, all three live tables enforcing their foreign
/// keys, each with an empty `_archive` peer.
pub async fn setup() -> Result<InMemoryStorage> {
    let storage = InMemoryStorage::new();

    storage
        .create_table(TableSchema::new(
            "boards",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("title", DataType::Text),
                Column::new("created_at", DataType::Timestamp),
                Column::new("published_at", DataType::Timestamp),
            ],
        ))
        .await?;
    storage
        .create_table(
            TableSchema::new(
                "cards",
                vec![
                    Column::new("id", DataType::Integer).primary_key(),
                    Column::new("title", DataType::Text),
                    Column::new("board_id", DataType::Integer),
                    Column::new("created_at", DataType::Timestamp),
                ],
            )
            .foreign_key("board_id", "boards"),
        )
        .await?;
    storage
        .create_table(
            TableSchema::new(
                "tags",
                vec![
                    Column::new("id", DataType::Integer).primary_key(),
                    Column::new("title", DataType::Text),
                    Column::new("card_id", DataType::Integer),
                    Column::new("created_at", DataType::Timestamp),
                ],
            )
            .foreign_key("card_id", "cards"),
        )
        .await?;

    for table in ["boards", "cards", "tags"] {
        storage.create_table_like(table, &format!("{}_archive", table)).await?;
    }
    Ok(storage)
}

pub fn mapping() -> DependencyGraph {
    DependencyGraph::builder()
        .entity("boards", |e| e.child("cards"))
        .entity("cards", |e| e.child("tags"))
        .build()
        .expect("valid graph")
}

pub async fn board(storage: &InMemoryStorage, id: i64, title: &str, created_at: DateTime<Utc>) -> Result<Key> {
    storage
        .insert(
            "boards",
            vec![Value::Integer(id), Value::from(title), Value::from(created_at), Value::Null],
        )
        .await
}

pub async fn card(
    storage: &InMemoryStorage,
    id: i64,
    title: &str,
    board_id: Option<i64>,
    created_at: DateTime<Utc>,
) -> Result<Key> {
    storage
        .insert(
            "cards",
            vec![Value::Integer(id), Value::from(title), Value::from(board_id), Value::from(created_at)],
        )
        .await
}

pub async fn tag(
    storage: &InMemoryStorage,
    id: i64,
    title: &str,
    card_id: Option<i64>,
    created_at: DateTime<Utc>,
) -> Result<Key> {
    storage
        .insert(
            "tags",
            vec![Value::Integer(id), Value::from(title), Value::from(card_id), Value::from(created_at)],
        )
        .await
}

/// The "actual" fixture every scenario starts from: a fresh board with one
/// fresh card carrying one fresh tag, all with id 1.
pub async fn actual_fixture(storage: &InMemoryStorage) -> Result<()> {
    let now = Utc::now();
    board(storage, 1, "Current issues", now).await?;
    card(storage, 1, "Create game", Some(1), now).await?;
    tag(storage, 1, "r1", Some(1), now).await?;
    Ok(())
}

/// Row counts of every fixture table, in [`TABLES`] order.
pub async fn counts(storage: &InMemoryStorage) -> Result<[usize; 6]> {
    let mut out = [0; 6];
    for (slot, table) in out.iter_mut().zip(TABLES) {
        *slot = storage.row_count(table).await?;
    }
    Ok(out)
}

/// Every row of every fixture table, for exact before/after comparisons.
pub async fn snapshot(storage: &InMemoryStorage) -> Result<Vec<Vec<Vec<Value>>>> {
    let mut out = Vec::new();
    for table in TABLES {
        out.push(storage.rows(table).await?);
    }
    Ok(out)
}
