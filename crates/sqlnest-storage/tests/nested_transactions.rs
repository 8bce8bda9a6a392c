// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for nested scopes on file-backed databases.

use std::cell::RefCell;
use std::path::Path;

use proptest::prelude::*;
use rusqlite::Connection;
use sqlnest_core::SqlnestError;
use sqlnest_storage::{configure, connect, ConnectOptions, TransactionalConnection};
use tempfile::{tempdir, TempDir};

thread_local! {
    static STATEMENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(sql: &str) {
    STATEMENTS.with(|s| s.borrow_mut().push(sql.trim().to_string()));
}

fn take_statements() -> Vec<String> {
    STATEMENTS.with(|s| std::mem::take(&mut *s.borrow_mut()))
}

fn count_prefix(statements: &[String], prefix: &str) -> usize {
    statements.iter().filter(|s| s.starts_with(prefix)).count()
}

/// Open a configured connection whose statements are recorded per thread.
fn traced(path: &Path) -> TransactionalConnection {
    let mut conn = Connection::open(path).unwrap();
    configure(&conn, &ConnectOptions::default()).unwrap();
    conn.execute_batch("CREATE TABLE IF NOT EXISTS items (name TEXT NOT NULL)")
        .unwrap();
    conn.trace(Some(record));
    take_statements();
    TransactionalConnection::new(conn)
}

fn fresh() -> (TempDir, TransactionalConnection) {
    let dir = tempdir().unwrap();
    let conn = traced(&dir.path().join("scopes.db"));
    (dir, conn)
}

fn insert(conn: &Connection, name: &str) -> sqlnest_core::Result<()> {
    conn.execute("INSERT INTO items (name) VALUES (?1)", [name])?;
    Ok(())
}

fn names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn.prepare("SELECT name FROM items ORDER BY rowid").unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap()
}

#[derive(Debug, PartialEq)]
enum WorkError {
    Manager(String),
    Failed(&'static str),
}

impl From<SqlnestError> for WorkError {
    fn from(e: SqlnestError) -> Self {
        Self::Manager(e.to_string())
    }
}

#[test]
fn failed_inner_scope_keeps_outer_row_and_reraises() {
    let (_dir, conn) = fresh();

    let result = conn.transaction(|tx| -> Result<Result<(), WorkError>, WorkError> {
        insert(tx, "A")?;
        let inner = tx.transaction(|tx| -> Result<(), WorkError> {
            insert(tx, "B")?;
            Err(WorkError::Failed("row B rejected"))
        });
        assert_eq!(tx.depth(), 1);
        assert!(tx.in_transaction());
        Ok(inner)
    });

    let inner = result.expect("outer scope should commit");
    assert_eq!(inner, Err(WorkError::Failed("row B rejected")));
    assert_eq!(names(&conn), vec!["A"]);
    assert!(!conn.in_transaction());
    assert!(conn.is_idle());

    let statements = take_statements();
    assert_eq!(count_prefix(&statements, "ROLLBACK TRANSACTION TO SAVEPOINT"), 1);
    assert_eq!(count_prefix(&statements, "RELEASE SAVEPOINT"), 1);
    assert_eq!(count_prefix(&statements, "COMMIT"), 1);
}

#[test]
fn failed_savepoint_is_released_after_rollback() {
    let (_dir, conn) = fresh();

    let outer = conn.begin().unwrap();
    let inner = conn.begin().unwrap();
    take_statements();
    inner.rollback().unwrap();
    assert_eq!(
        take_statements(),
        vec![
            "ROLLBACK TRANSACTION TO SAVEPOINT sqlnest_sp_1",
            "RELEASE SAVEPOINT sqlnest_sp_1",
        ]
    );
    assert!(conn.in_transaction());
    assert_eq!(conn.depth(), 1);

    outer.commit().unwrap();
    assert!(!conn.in_transaction());
}

#[test]
fn out_of_order_close_drains_to_idle() {
    let (_dir, conn) = fresh();

    let outer = conn.begin().unwrap();
    insert(&conn, "orphan").unwrap();
    let inner = conn.begin().unwrap();
    assert!(outer.commit().unwrap_err().is_invariant_violation());
    inner.commit().unwrap();

    assert!(conn.is_idle());
    assert!(!conn.in_transaction());
    conn.transaction(|tx| insert(tx, "balanced")).unwrap();
    assert!(conn.is_idle());
    assert_eq!(names(&conn), vec!["balanced"]);
}

#[test]
fn two_levels_commit_once_and_release_once() {
    let (_dir, conn) = fresh();

    let outer = conn.begin().unwrap();
    let inner = conn.begin().unwrap();
    inner.commit().unwrap();
    let after_inner = take_statements();
    assert_eq!(count_prefix(&after_inner, "RELEASE SAVEPOINT"), 1);
    assert_eq!(count_prefix(&after_inner, "COMMIT"), 0);

    outer.commit().unwrap();
    let after_outer = take_statements();
    assert_eq!(after_outer, vec!["COMMIT TRANSACTION"]);
    assert!(!conn.in_transaction());
}

#[test]
fn engine_flag_follows_scope_stack() {
    let (_dir, conn) = fresh();
    assert!(!conn.in_transaction());

    let outer = conn.begin().unwrap();
    assert!(conn.in_transaction());
    let inner = conn.begin().unwrap();
    assert!(conn.in_transaction());
    inner.rollback().unwrap();
    assert!(conn.in_transaction());
    outer.rollback().unwrap();
    assert!(!conn.in_transaction());

    conn.transaction(|tx| insert(tx, "again")).unwrap();
    assert_eq!(names(&conn), vec!["again"]);
}

#[test]
fn sequential_siblings_never_collide() {
    let (_dir, conn) = fresh();

    conn.transaction(|tx| -> sqlnest_core::Result<()> {
        let mut seen = Vec::new();
        for i in 0..5 {
            let scope = tx.begin()?;
            seen.push(tx.current_savepoint().unwrap());
            insert(tx, &format!("row{i}"))?;
            scope.commit()?;
        }
        assert!(seen.iter().all(|name| name == &seen[0]));
        Ok(())
    })
    .unwrap();

    assert_eq!(names(&conn).len(), 5);
}

#[test]
fn exit_after_external_rollback_is_invariant_violation() {
    let (_dir, conn) = fresh();

    let scope = conn.begin().unwrap();
    conn.execute_batch("ROLLBACK").unwrap();
    let err = scope.commit().unwrap_err();
    assert!(err.is_invariant_violation(), "got {err:?}");
    assert!(matches!(
        err,
        SqlnestError::InvariantViolation { operation: "exit-scope", .. }
    ));
}

#[test]
fn committed_rows_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.db");

    {
        let conn = connect(&path, &ConnectOptions::default()).unwrap();
        conn.execute_batch("CREATE TABLE items (name TEXT NOT NULL)")
            .unwrap();
        conn.transaction(|tx| -> sqlnest_core::Result<()> {
            insert(tx, "kept")?;
            let _ = tx.transaction(|tx| -> Result<(), WorkError> {
                insert(tx, "discarded")?;
                Err(WorkError::Failed("nope"))
            });
            Ok(())
        })
        .unwrap();
    }

    let conn = connect(&path, &ConnectOptions::default()).unwrap();
    assert_eq!(names(&conn), vec!["kept"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn depth_d_commits_once_and_releases_d_minus_one(depth in 0usize..10) {
        let (_dir, conn) = fresh();

        let mut scopes = Vec::with_capacity(depth);
        for _ in 0..depth {
            scopes.push(conn.begin().unwrap());
        }
        prop_assert_eq!(conn.depth(), depth);
        while let Some(scope) = scopes.pop() {
            scope.commit().unwrap();
        }

        let statements = take_statements();
        prop_assert_eq!(count_prefix(&statements, "BEGIN"), depth.min(1));
        prop_assert_eq!(count_prefix(&statements, "COMMIT"), depth.min(1));
        prop_assert_eq!(count_prefix(&statements, "RELEASE SAVEPOINT"), depth.saturating_sub(1));
        prop_assert_eq!(count_prefix(&statements, "ROLLBACK"), 0);
        prop_assert!(!conn.in_transaction());
        prop_assert!(conn.is_idle());
    }
}
