#![cfg(feature = "sqlite")]

use std::sync::Arc;
use std::time::Duration;

use sql_dispatch::prelude::*;

/// A database that never connects: submitted work sits unexecuted, so the
/// caller-visible timeout on the pending result is what fires.
#[tokio::test(flavor = "multi_thread")]
async fn unexecuted_queries_expire_instead_of_succeeding() {
    let config = CoreConfig::default();
    let pending = Arc::new(PendingResultManager::new());
    let queues = Arc::new(DatabaseQueueManager::new(2).expect("manager"));

    let lead = DatabaseQueue::create_lead(
        LeadQueueOptions {
            database_name: "darkdb".to_string(),
            connection_name: None,
            connection_string: "/nonexistent-dir/dark.sqlite".to_string(),
            engine: DatabaseType::Sqlite,
            bootstrap_sql: None,
        },
        &config,
        Arc::clone(&pending),
    )
    .expect("lead queue");
    queues.add_database(Arc::clone(&lead)).expect("registered");

    let dispatcher = QueryDispatcher::new(Arc::clone(&queues), Arc::clone(&pending), &config);

    let err = dispatcher
        .submit_and_wait(
            QueryRequest::sql("darkdb", "SELECT 1", vec![])
                .with_timeout(Duration::from_millis(100)),
        )
        .await;
    assert!(matches!(err, Err(SqlDispatchError::ResultExpired(_))));

    // The sweeper reclaims the expired entry
    let _ = pending.reclaim_expired();
    assert_eq!(pending.count(), 0);

    // The queue never became ready
    assert!(!lead.wait_until_ready(Duration::from_millis(50)));
    queues.shutdown_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn sweeper_task_reclaims_in_the_background() {
    let pending = Arc::new(PendingResultManager::new());
    pending
        .register("q-orphan", Duration::from_millis(10))
        .expect("register");

    let sweeper = pending.start_sweeper(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(pending.count(), 0);
    sweeper.abort();
}
