#![cfg(feature = "sqlite")]

use std::sync::Arc;
use std::time::Duration;

use sql_dispatch::prelude::*;

struct StaticQueryTable;

impl QueryTableCache for StaticQueryTable {
    fn lookup(
        &self,
        query_ref: &str,
        _queue_kind: QueueKind,
        _database_label: &str,
    ) -> Option<QueryCacheEntry> {
        match query_ref {
            "scores_by_floor" => Some(QueryCacheEntry {
                sql_template: "SELECT name, score FROM scores WHERE score >= $1 ORDER BY score"
                    .to_string(),
                timeout: Duration::from_secs(10),
                queue_kind: QueueKind::Fast,
                engine: DatabaseType::Sqlite,
            }),
            _ => None,
        }
    }
}

fn dispatcher_for(
    db_path: &str,
) -> (QueryDispatcher, Arc<DatabaseQueueManager>, Arc<DatabaseQueue>) {
    // RUST_LOG=sql_dispatch=debug surfaces queue/pool/pending traces
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let config = CoreConfig::default().with_default_query_timeout(Duration::from_secs(10));
    let pending = Arc::new(PendingResultManager::new());
    let queues = Arc::new(DatabaseQueueManager::new(4).expect("manager"));

    let lead = DatabaseQueue::create_lead(
        LeadQueueOptions {
            database_name: "scoresdb".to_string(),
            connection_name: Some("scores-conn".to_string()),
            connection_string: db_path.to_string(),
            engine: DatabaseType::Sqlite,
            bootstrap_sql: Some(
                "CREATE TABLE IF NOT EXISTS scores (name TEXT NOT NULL, score INTEGER NOT NULL);"
                    .to_string(),
            ),
        },
        &config,
        Arc::clone(&pending),
    )
    .expect("lead queue");
    queues
        .add_database(Arc::clone(&lead))
        .expect("registered database");

    let dispatcher = QueryDispatcher::new(Arc::clone(&queues), pending, &config)
        .with_query_table(Arc::new(StaticQueryTable));
    (dispatcher, queues, lead)
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_and_wait_round_trips_through_the_worker() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("scores.db");
    let (dispatcher, _queues, lead) = dispatcher_for(db_path.to_str().expect("utf8 path"));

    assert!(lead.wait_until_ready(Duration::from_secs(5)));
    assert!(lead.health_check());

    // Parameterized inserts in canonical placeholder style
    for (name, score) in [("alice", 90_i64), ("bob", 55), ("carol", 72)] {
        let outcome = dispatcher
            .submit_and_wait(QueryRequest::sql(
                "scoresdb",
                "INSERT INTO scores (name, score) VALUES ($1, $2)",
                vec![RowValues::Text(name.to_string()), RowValues::Int(score)],
            ))
            .await
            .expect("insert");
        assert!(outcome.success);
        assert_eq!(outcome.rows_affected, 1);
    }

    let outcome = dispatcher
        .submit_and_wait(QueryRequest::sql(
            "scoresdb",
            "SELECT name, score FROM scores WHERE score >= $1 ORDER BY score",
            vec![RowValues::Int(60)],
        ))
        .await
        .expect("select");
    assert!(outcome.success);
    let rows = outcome.result.expect("result set");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.rows[0].get("name").unwrap().as_text().unwrap(), "carol");
    assert_eq!(*rows.rows[1].get("score").unwrap().as_int().unwrap(), 90);

    // Nothing lingers in the pending registry after retrieval
    assert_eq!(dispatcher.pending().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_hints_route_to_spawned_workers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("scores.db");
    let (dispatcher, _queues, lead) = dispatcher_for(db_path.to_str().expect("utf8 path"));
    assert!(lead.wait_until_ready(Duration::from_secs(5)));

    let outcome = dispatcher
        .submit_and_wait(
            QueryRequest::sql(
                "scoresdb",
                "INSERT INTO scores (name, score) VALUES ($1, $2)",
                vec![RowValues::Text("dave".to_string()), RowValues::Int(41)],
            )
            .with_queue_hint("slow"),
        )
        .await
        .expect("insert via slow worker");
    assert!(outcome.success);

    // The hint spawned a slow worker under the lead
    let slow = lead.child(QueueKind::Slow).expect("slow worker exists");
    assert_eq!(slow.kind(), QueueKind::Slow);
    assert!(!slow.can_spawn_queues());

    // An unknown hint lands on the medium worker
    let outcome = dispatcher
        .submit_and_wait(
            QueryRequest::sql("scoresdb", "SELECT COUNT(*) AS n FROM scores", vec![])
                .with_queue_hint("bogus"),
        )
        .await
        .expect("select via medium worker");
    assert!(outcome.success);
    assert!(lead.child(QueueKind::Medium).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn referenced_queries_resolve_through_the_query_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("scores.db");
    let (dispatcher, _queues, lead) = dispatcher_for(db_path.to_str().expect("utf8 path"));
    assert!(lead.wait_until_ready(Duration::from_secs(5)));

    dispatcher
        .submit_and_wait(QueryRequest::sql(
            "scoresdb",
            "INSERT INTO scores (name, score) VALUES ($1, $2)",
            vec![RowValues::Text("erin".to_string()), RowValues::Int(88)],
        ))
        .await
        .expect("insert");

    // Resolved by reference; the entry's queue kind (fast) wins over no hint
    let outcome = dispatcher
        .submit_and_wait(QueryRequest::by_ref(
            "scoresdb",
            "scores_by_floor",
            vec![RowValues::Int(80)],
        ))
        .await
        .expect("referenced select");
    assert!(outcome.success);
    assert_eq!(outcome.result.expect("rows").len(), 1);
    assert!(lead.child(QueueKind::Fast).is_some());

    // Unknown references fail without leaking a pending entry
    let err = dispatcher
        .submit_and_wait(QueryRequest::by_ref("scoresdb", "nope", vec![]))
        .await;
    assert!(matches!(err, Err(SqlDispatchError::QueryRefNotFound(_))));
    assert_eq!(dispatcher.pending().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_name_fallback_resolves_first_match() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("scores.db");
    let (dispatcher, _queues, lead) = dispatcher_for(db_path.to_str().expect("utf8 path"));
    assert!(lead.wait_until_ready(Duration::from_secs(5)));

    // Exact database name and the connection-name alias both resolve
    assert!(dispatcher.resolve_queue("scoresdb").is_some());
    let by_alias = dispatcher.resolve_queue("scores-conn").expect("alias hit");
    assert_eq!(by_alias.database_name(), "scoresdb");
    assert!(dispatcher.resolve_queue("unknown").is_none());

    let err = dispatcher.submit(QueryRequest::sql("unknown", "SELECT 1", vec![]));
    assert!(matches!(err, Err(SqlDispatchError::UnknownDatabase(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn per_query_failures_keep_the_worker_alive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("scores.db");
    let (dispatcher, _queues, lead) = dispatcher_for(db_path.to_str().expect("utf8 path"));
    assert!(lead.wait_until_ready(Duration::from_secs(5)));

    let outcome = dispatcher
        .submit_and_wait(QueryRequest::sql(
            "scoresdb",
            "SELECT * FROM missing_table",
            vec![],
        ))
        .await
        .expect("failed query still completes its pending entry");
    assert!(!outcome.success);
    assert!(outcome.error_message.is_some());

    // The same worker keeps serving after the failure
    let outcome = dispatcher
        .submit_and_wait(QueryRequest::sql(
            "scoresdb",
            "SELECT COUNT(*) AS n FROM scores",
            vec![],
        ))
        .await
        .expect("follow-up query");
    assert!(outcome.success);
    assert!(lead.health_check());

    let (processed, failed) = lead.counters();
    assert!(processed >= 1);
    assert!(failed >= 1);

    let mut stats = String::new();
    lead.write_stats(&mut stats);
    assert!(stats.contains("scoresdb"));
    assert!(stats.contains("depth=0"));
}
