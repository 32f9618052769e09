//! Connection lifecycle and transaction control tests against a temporary
//! SQLite database.

use db_session::{Command, DbError, Session};
use tempfile::TempPath;

/// Temporary database file, deleted when the returned path is dropped.
fn temp_db() -> (String, TempPath) {
    let file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    let path = file.into_temp_path();
    let url = format!("sqlite:{}", path.to_str().expect("non-utf8 temp path"));
    (url, path)
}

async fn session_with_schema() -> (Session, TempPath) {
    let (url, path) = temp_db();
    let mut session = Session::connect_lazy(url).expect("failed to create session");
    session
        .execute_adjust(&Command::text(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT)",
        ))
        .await
        .expect("failed to create schema");
    (session, path)
}

async fn count_notes(session: &mut Session) -> i64 {
    let rows = session
        .execute_select(&Command::text("SELECT COUNT(*) AS n FROM notes"))
        .await
        .expect("count query failed");
    rows[0].value_or("n", 0).expect("count column missing")
}

#[tokio::test]
async fn test_open_and_close_are_idempotent() {
    let (url, _path) = temp_db();
    let mut session = Session::connect_lazy(url).expect("failed to create session");
    assert!(!session.is_open());

    session.open_connection().await.expect("first open failed");
    assert!(session.is_open());
    session.open_connection().await.expect("second open failed");
    assert!(session.is_open());

    session.close_connection().await;
    assert!(!session.is_open());
    session.close_connection().await;
    assert!(!session.is_open());
}

#[tokio::test]
async fn test_session_reopens_after_close() {
    let (mut session, _path) = session_with_schema().await;
    session.close_connection().await;

    // any operation reopens lazily
    assert_eq!(count_notes(&mut session).await, 0);
}

#[tokio::test]
async fn test_commit_persists_and_closes() {
    let (mut session, _path) = session_with_schema().await;

    session.begin_transaction(None).await.expect("begin failed");
    assert!(session.in_transaction());
    session
        .execute_insert(&Command::text("INSERT INTO notes (title) VALUES (?) RETURNING id").bind("kept"))
        .await
        .expect("insert failed");
    session.commit_transaction().await.expect("commit failed");

    assert!(!session.in_transaction());
    assert!(!session.is_open());
    assert_eq!(count_notes(&mut session).await, 1);
}

#[tokio::test]
async fn test_rollback_discards_and_closes() {
    let (mut session, _path) = session_with_schema().await;

    session.begin_transaction(None).await.expect("begin failed");
    session
        .execute_insert(&Command::text("INSERT INTO notes (title) VALUES (?) RETURNING id").bind("gone"))
        .await
        .expect("insert failed");
    session
        .rollback_transaction()
        .await
        .expect("rollback failed");

    assert!(!session.in_transaction());
    assert!(!session.is_open());
    assert_eq!(count_notes(&mut session).await, 0);
}

#[tokio::test]
async fn test_close_discards_active_transaction() {
    let (mut session, _path) = session_with_schema().await;

    session.begin_transaction(None).await.expect("begin failed");
    session
        .execute_insert(&Command::text("INSERT INTO notes (title) VALUES (?) RETURNING id").bind("gone"))
        .await
        .expect("insert failed");
    session.close_connection().await;

    assert!(!session.in_transaction());
    assert_eq!(count_notes(&mut session).await, 0);
}

#[tokio::test]
async fn test_commit_without_transaction_errors() {
    let (mut session, _path) = session_with_schema().await;

    let err = session.commit_transaction().await.unwrap_err();
    assert!(matches!(err, DbError::Transaction { .. }));
}

#[tokio::test]
async fn test_rollback_without_transaction_is_tolerated() {
    let (mut session, _path) = session_with_schema().await;

    session
        .rollback_transaction()
        .await
        .expect("bare rollback should succeed");
    assert!(!session.is_open());
}

#[tokio::test]
async fn test_empty_command_is_rejected() {
    let (mut session, _path) = session_with_schema().await;

    let err = session
        .execute_select(&Command::text("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidCommand { .. }));
}

#[tokio::test]
async fn test_select_outside_transaction_closes_session() {
    let (mut session, _path) = session_with_schema().await;

    count_notes(&mut session).await;
    assert!(!session.is_open());
}

#[tokio::test]
async fn test_writes_outside_transaction_keep_session_open() {
    let (mut session, _path) = session_with_schema().await;

    session
        .execute_insert(&Command::text("INSERT INTO notes (title) VALUES (?) RETURNING id").bind("a"))
        .await
        .expect("insert failed");
    assert!(session.is_open());

    let affected = session
        .execute_adjust(&Command::text("UPDATE notes SET title = ?").bind("b"))
        .await
        .expect("update failed");
    assert_eq!(affected, 1);
    assert!(session.is_open());
}
