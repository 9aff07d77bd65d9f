#![cfg(feature = "sqlite")]

use sql_dispatch::prelude::*;

/// Capacity-2 cache on one live connection: the third prepare evicts exactly
/// the least recently used statement and the count never exceeds capacity.
#[tokio::test(flavor = "multi_thread")]
async fn statement_cache_evicts_oldest_at_capacity() {
    let mut conn = EngineConnection::connect(DatabaseType::Sqlite, ":memory:", 2)
        .await
        .expect("connection");

    conn.execute_batch("CREATE TABLE t (a INTEGER);")
        .await
        .expect("ddl");

    assert!(!conn.prepare("stmt_1", "SELECT a FROM t WHERE a = ?1").await.expect("prepare 1"));
    assert!(!conn.prepare("stmt_2", "SELECT a + 1 FROM t").await.expect("prepare 2"));
    assert_eq!(conn.cached_statement_count().await, 2);

    // stmt_1 is oldest; preparing stmt_3 displaces it
    assert!(!conn.prepare("stmt_3", "SELECT a + 2 FROM t").await.expect("prepare 3"));
    assert_eq!(conn.cached_statement_count().await, 2);

    // stmt_2 and stmt_3 are hits, stmt_1 is gone (re-preparing it is a fresh
    // compile, not a hit)
    assert!(conn.prepare("stmt_2", "SELECT a + 1 FROM t").await.expect("hit"));
    assert!(conn.prepare("stmt_3", "SELECT a + 2 FROM t").await.expect("hit"));
    assert!(!conn.prepare("stmt_1", "SELECT a FROM t WHERE a = ?1").await.expect("recompile"));
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_failure_leaves_the_cache_untouched() {
    let mut conn = EngineConnection::connect(DatabaseType::Sqlite, ":memory:", 4)
        .await
        .expect("connection");
    conn.execute_batch("CREATE TABLE t (a INTEGER);")
        .await
        .expect("ddl");

    conn.prepare("good", "SELECT a FROM t").await.expect("prepare");
    assert_eq!(conn.cached_statement_count().await, 1);

    let err = conn.prepare("bad", "SELECT nope FROM nowhere").await;
    assert!(err.is_err());
    assert_eq!(conn.cached_statement_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn prepared_execution_flows_through_the_cache() {
    let mut conn = EngineConnection::connect(DatabaseType::Sqlite, ":memory:", 4)
        .await
        .expect("connection");
    conn.execute_batch("CREATE TABLE t (a INTEGER, b TEXT);")
        .await
        .expect("ddl");

    let insert_sql = "INSERT INTO t (a, b) VALUES (?1, ?2)";
    conn.prepare("ins", insert_sql).await.expect("prepare");
    for i in 0..3 {
        let affected = conn
            .execute_prepared_dml(
                "ins",
                insert_sql,
                &[RowValues::Int(i), RowValues::Text(format!("row{i}"))],
            )
            .await
            .expect("insert");
        assert_eq!(affected, 1);
    }

    let select_sql = "SELECT b FROM t WHERE a = ?1";
    conn.prepare("sel", select_sql).await.expect("prepare");
    let rows = conn
        .execute_prepared_select("sel", select_sql, &[RowValues::Int(1)])
        .await
        .expect("select");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.rows[0].get("b").unwrap().as_text().unwrap(), "row1");

    // Cache miss path: executing an unprepared name still works, uncached
    let rows = conn
        .execute_prepared_select("never_prepared", "SELECT COUNT(*) AS n FROM t", &[])
        .await
        .expect("uncached select");
    assert_eq!(*rows.rows[0].get("n").unwrap().as_int().unwrap(), 3);
    assert_eq!(conn.cached_statement_count().await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn transactions_compose_with_the_executor_contract() {
    let mut conn = EngineConnection::connect(DatabaseType::Sqlite, ":memory:", 4)
        .await
        .expect("connection");
    conn.execute_batch("CREATE TABLE t (a INTEGER);")
        .await
        .expect("ddl");

    conn.begin().await.expect("begin");
    conn.execute_dml("INSERT INTO t (a) VALUES (?1)", &[RowValues::Int(1)])
        .await
        .expect("insert");
    conn.rollback().await.expect("rollback");

    let rows = conn
        .execute_select("SELECT COUNT(*) AS n FROM t", &[])
        .await
        .expect("count");
    assert_eq!(*rows.rows[0].get("n").unwrap().as_int().unwrap(), 0);

    conn.begin().await.expect("begin");
    conn.execute_dml("INSERT INTO t (a) VALUES (?1)", &[RowValues::Int(2)])
        .await
        .expect("insert");
    conn.commit().await.expect("commit");

    let rows = conn
        .execute_select("SELECT COUNT(*) AS n FROM t", &[])
        .await
        .expect("count");
    assert_eq!(*rows.rows[0].get("n").unwrap().as_int().unwrap(), 1);
}
