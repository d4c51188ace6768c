/// Archive tests
///
/// Cascading archive of boards -> cards -> tags into their `_archive` tables.
/// Run with: cargo test --test archive_tests

mod common;

use cascade_archive::core::{Column, DataType, Result, Value};
use cascade_archive::storage::{StorageEngine, TableSchema};
use cascade_archive::{
    ArchiveConfig, ArchiveError, Cascade, DependencyGraph, InMemoryStorage, Key, Predicate, Selection,
};
use common::*;

#[tokio::test]
async fn test_nothing_outdated_changes_nothing() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    let before = snapshot(&storage).await?;

    cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await?;

    assert_eq!(snapshot(&storage).await?, before);
    assert_eq!(counts(&storage).await?, [1, 0, 1, 0, 1, 0]);
    Ok(())
}

#[tokio::test]
async fn test_outdated_root_without_children() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    let original = storage.get_row("boards", &Key::Integer(2)).await?;

    cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await?;

    assert_eq!(counts(&storage).await?, [1, 1, 1, 0, 1, 0]);
    assert_eq!(storage.get_row("boards", &Key::Integer(2)).await?, None);
    assert_eq!(storage.get_row("boards_archive", &Key::Integer(2)).await?, original);
    Ok(())
}

#[tokio::test]
async fn test_board_card_tag_scenario() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;

    // Old board, fresh card, old tag: the card goes because its board does
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    card(&storage, 2, "Fresh card", Some(2), days_ago(0)).await?;
    tag(&storage, 2, "r2", Some(2), days_ago(2)).await?;

    cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await?;

    assert_eq!(counts(&storage).await?, [1, 1, 1, 1, 1, 1]);
    assert!(storage.get_row("cards_archive", &Key::Integer(2)).await?.is_some());
    assert!(storage.get_row("tags_archive", &Key::Integer(2)).await?.is_some());
    assert!(storage.get_row("tags", &Key::Integer(1)).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_outdated_child_of_actual_parent_stays_live() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    card(&storage, 2, "Old card", Some(1), days_ago(5)).await?;
    tag(&storage, 2, "Old tag", Some(1), days_ago(5)).await?;

    cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await?;

    assert_eq!(counts(&storage).await?, [1, 0, 2, 0, 2, 0]);
    Ok(())
}

#[tokio::test]
async fn test_complicated_relations() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;

    board(&storage, 2, "Archive board", days_ago(2)).await?;
    card(&storage, 2, "Archive card", None, days_ago(2)).await?;
    tag(&storage, 2, "r2", None, days_ago(2)).await?;
    card(&storage, 3, "Related to outdated board", Some(2), days_ago(0)).await?;
    card(&storage, 4, "Related to actual board", Some(1), days_ago(0)).await?;
    tag(&storage, 3, "critical", Some(3), days_ago(0)).await?;

    cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await?;

    // Orphans are only reachable through a parent, so they stay
    assert_eq!(counts(&storage).await?, [1, 1, 3, 1, 2, 1]);
    assert!(storage.get_row("cards_archive", &Key::Integer(3)).await?.is_some());
    assert!(storage.get_row("tags_archive", &Key::Integer(3)).await?.is_some());
    assert!(storage.get_row("cards", &Key::Integer(2)).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_expiration_column_override() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    let graph = DependencyGraph::builder()
        .entity("boards", |e| e.child("cards").expiration_column("published_at"))
        .entity("cards", |e| e.child("tags"))
        .build()?;

    // Created long ago but published just now
    storage
        .insert(
            "boards",
            vec![
                Value::Integer(2),
                Value::from("Recently published"),
                Value::from(days_ago(5)),
                Value::from(days_ago(0)),
            ],
        )
        .await?;
    card(&storage, 2, "Card", Some(2), days_ago(5)).await?;

    cascade_archive::archive(&storage, "boards", cutoff(), &graph).await?;
    assert_eq!(counts(&storage).await?, [2, 0, 2, 0, 1, 0]);

    storage
        .insert(
            "boards",
            vec![
                Value::Integer(3),
                Value::from("Published long ago"),
                Value::from(days_ago(0)),
                Value::from(days_ago(3)),
            ],
        )
        .await?;
    card(&storage, 3, "Card", Some(3), days_ago(0)).await?;

    cascade_archive::archive(&storage, "boards", cutoff(), &graph).await?;
    assert_eq!(counts(&storage).await?, [2, 1, 2, 1, 1, 0]);
    assert!(storage.get_row("boards_archive", &Key::Integer(3)).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_default_scope_does_not_hide_rows_from_archive() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    card(&storage, 2, "Related to outdated board", Some(2), days_ago(0)).await?;

    // Equivalent of `default_scope { where("1=0") }`
    storage.set_default_scope("cards", Predicate::Nothing).await?;
    assert_eq!(storage.scoped_count("cards").await?, 0);

    cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await?;

    assert_eq!(storage.row_count("boards").await?, 1);
    assert_eq!(storage.row_count("boards_archive").await?, 1);
    assert_eq!(storage.row_count("cards").await?, 1);
    assert_eq!(storage.row_count("cards_archive").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_archive_is_idempotent() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    card(&storage, 2, "Card", Some(2), days_ago(2)).await?;

    let date = cutoff();
    cascade_archive::archive(&storage, "boards", date, &mapping()).await?;
    let after_first = snapshot(&storage).await?;
    let journal_len = storage.journal().await.len();

    cascade_archive::archive(&storage, "boards", date, &mapping()).await?;

    assert_eq!(snapshot(&storage).await?, after_first);
    assert_eq!(storage.journal().await.len(), journal_len);
    Ok(())
}

#[tokio::test]
async fn test_children_are_archived_before_parents() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    card(&storage, 2, "Card", Some(2), days_ago(0)).await?;
    tag(&storage, 2, "Tag", Some(2), days_ago(0)).await?;
    let start = storage.journal().await.len();

    cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await?;

    let journal = storage.journal().await;
    let moves = &journal[start..];
    assert_eq!(moves.len(), 3);
    assert_eq!((moves[0].inserted_into("tags_archive"), moves[0].deleted_from("tags")), (1, 1));
    assert_eq!((moves[1].inserted_into("cards_archive"), moves[1].deleted_from("cards")), (1, 1));
    assert_eq!((moves[2].inserted_into("boards_archive"), moves[2].deleted_from("boards")), (1, 1));
    Ok(())
}

#[tokio::test]
async fn test_archive_scope_without_matches_does_no_work() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    let before = storage.transaction_stats().await;

    let selection = Selection::new("boards", Predicate::eq("id", 0i64));
    cascade_archive::archive_scope(&storage, selection, &mapping()).await?;

    assert_eq!(storage.transaction_stats().await.begun, before.begun);
    assert_eq!(counts(&storage).await?, [1, 0, 1, 0, 1, 0]);
    Ok(())
}

#[tokio::test]
async fn test_archive_scope_moves_selection_and_dependents() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    card(&storage, 2, "Archive card", None, days_ago(2)).await?;
    tag(&storage, 2, "r2", None, days_ago(2)).await?;

    let selection = Selection::new("boards", Predicate::eq("id", 1i64));
    cascade_archive::archive_scope(&storage, selection, &mapping()).await?;

    // Explicit selections ignore the expiration column entirely
    assert_eq!(counts(&storage).await?, [1, 1, 1, 1, 1, 1]);
    assert!(storage.get_row("boards", &Key::Integer(2)).await?.is_some());
    assert!(storage.get_row("tags_archive", &Key::Integer(1)).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_in_archive_rolls_back_batch() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    storage
        .insert(
            "boards_archive",
            vec![Value::Integer(2), Value::from("archived twice"), Value::from(days_ago(9)), Value::Null],
        )
        .await?;

    let result = cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await;

    match result {
        Err(ArchiveError::ConstraintViolation(msg)) => assert!(msg.contains("duplicate key")),
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }
    assert!(storage.get_row("boards", &Key::Integer(2)).await?.is_some());
    assert_eq!(storage.row_count("boards_archive").await?, 1);
    assert_eq!(storage.transaction_stats().await.active, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_parent_move_keeps_committed_children() -> Result<()> {
    let storage = setup().await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    card(&storage, 2, "Card", Some(2), days_ago(0)).await?;
    storage
        .insert(
            "boards_archive",
            vec![Value::Integer(2), Value::from("stale"), Value::from(days_ago(9)), Value::Null],
        )
        .await?;

    let result = cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await;
    assert!(result.is_err());

    // Per-batch atomicity only: the card batch had already committed
    assert_eq!(counts(&storage).await?, [1, 1, 0, 1, 0, 0]);

    // Once the conflict is cleared, re-running finishes the job
    let mut tx = storage.begin().await?;
    storage.delete_rows(&mut tx, "boards_archive", "id", &[Key::Integer(2)]).await?;
    storage.commit(tx).await?;
    cascade_archive::archive(&storage, "boards", cutoff(), &mapping()).await?;
    assert_eq!(counts(&storage).await?, [0, 1, 0, 1, 0, 0]);
    Ok(())
}

#[tokio::test]
async fn test_small_batches_cover_every_row() -> Result<()> {
    let storage = setup().await?;
    for id in 1..=5 {
        board(&storage, id, "Old board", days_ago(3)).await?;
        card(&storage, id * 10, "Card", Some(id), days_ago(0)).await?;
        card(&storage, id * 10 + 1, "Card", Some(id), days_ago(0)).await?;
    }
    let start = storage.journal().await.len();

    let cascade = Cascade::with_config(storage, ArchiveConfig::new().batch_size(1))?;
    cascade.archive("boards", cutoff(), &mapping()).await?;

    let storage = cascade.storage();
    assert_eq!(counts(storage).await?, [0, 5, 0, 10, 0, 0]);
    // One move per board plus one per card
    assert_eq!(storage.journal().await.len() - start, 15);
    Ok(())
}

#[tokio::test]
async fn test_custom_archive_suffix() -> Result<()> {
    let storage = setup().await?;
    storage.create_table_like("boards", "boards_history").await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;

    let cascade = Cascade::with_config(storage, ArchiveConfig::new().archive_suffix("_history"))?;
    cascade.archive("boards", cutoff(), &DependencyGraph::empty()).await?;

    assert_eq!(cascade.storage().row_count("boards_history").await?, 1);
    assert_eq!(cascade.storage().row_count("boards_archive").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_archive_table_must_mirror_live_table() -> Result<()> {
    let storage = InMemoryStorage::new();
    storage
        .create_table(TableSchema::new(
            "notes",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("body", DataType::Text),
                Column::new("created_at", DataType::Timestamp),
            ],
        ))
        .await?;
    storage
        .create_table(TableSchema::new(
            "notes_archive",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("created_at", DataType::Timestamp),
            ],
        ))
        .await?;
    storage
        .insert("notes", vec![Value::Integer(1), Value::from("x"), Value::from(days_ago(3))])
        .await?;

    let result = cascade_archive::archive(&storage, "notes", cutoff(), &DependencyGraph::empty()).await;

    assert!(matches!(result, Err(ArchiveError::SchemaMismatch { .. })));
    assert_eq!(storage.row_count("notes").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_graph_loaded_from_json() -> Result<()> {
    let storage = setup().await?;
    actual_fixture(&storage).await?;
    board(&storage, 2, "Archive board", days_ago(2)).await?;
    card(&storage, 2, "Card", Some(2), days_ago(0)).await?;
    tag(&storage, 2, "Tag", Some(2), days_ago(0)).await?;

    let graph = DependencyGraph::from_json(
        r#"{ "entities": { "boards": { "children": ["cards"] }, "cards": { "children": ["tags"] } } }"#,
    )?;
    cascade_archive::archive(&storage, "boards", cutoff(), &graph).await?;

    assert_eq!(counts(&storage).await?, [1, 1, 1, 1, 1, 1]);
    Ok(())
}

#[tokio::test]
async fn test_config_expiration_column_applies_without_graph_entry() -> Result<()> {
    let storage = setup().await?;
    storage
        .insert(
            "boards",
            vec![
                Value::Integer(3),
                Value::from("Published long ago"),
                Value::from(days_ago(0)),
                Value::from(days_ago(5)),
            ],
        )
        .await?;
    board(&storage, 4, "Fresh", days_ago(0)).await?;

    let config = ArchiveConfig::new().default_expiration_column("published_at");
    let cascade = Cascade::with_config(storage, config)?;
    cascade.archive("boards", cutoff(), &DependencyGraph::empty()).await?;

    let storage = cascade.storage();
    assert_eq!(storage.row_count("boards_archive").await?, 1);
    assert!(storage.get_row("boards_archive", &Key::Integer(3)).await?.is_some());
    assert!(storage.get_row("boards", &Key::Integer(4)).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_config_primary_key_applies_without_graph_entry() -> Result<()> {
    let storage = InMemoryStorage::new();
    storage
        .create_table(TableSchema::new(
            "notes",
            vec![
                Column::new("uid", DataType::Integer).primary_key(),
                Column::new("body", DataType::Text),
                Column::new("created_at", DataType::Timestamp),
            ],
        ))
        .await?;
    storage.create_table_like("notes", "notes_archive").await?;
    for (uid, age) in [(1i64, 3), (2, 0), (3, 5)] {
        storage
            .insert("notes", vec![Value::Integer(uid), Value::from("note"), Value::from(days_ago(age))])
            .await?;
    }

    let cascade = Cascade::with_config(storage, ArchiveConfig::new().default_primary_key("uid"))?;
    cascade.archive("notes", cutoff(), &DependencyGraph::empty()).await?;

    assert_eq!(cascade.storage().row_count("notes").await?, 1);
    assert_eq!(cascade.storage().row_count("notes_archive").await?, 2);

    cascade.restore_scope(Selection::all("notes"), &DependencyGraph::empty()).await?;
    assert_eq!(cascade.storage().row_count("notes").await?, 3);
    Ok(())
}
