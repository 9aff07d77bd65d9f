#![cfg(feature = "sqlite")]

use sql_dispatch::prelude::*;
use tokio::runtime::Runtime;

/// A lead whose database can never be opened: the worker thread stays in its
/// connect-retry loop, so the pending-work list is observable from the test.
fn unconnectable_lead(
    config: &CoreConfig,
    pending: std::sync::Arc<PendingResultManager>,
) -> std::sync::Arc<DatabaseQueue> {
    DatabaseQueue::create_lead(
        LeadQueueOptions {
            database_name: "testdb".to_string(),
            connection_name: None,
            connection_string: "/nonexistent-dir/testdb.sqlite".to_string(),
            engine: DatabaseType::Sqlite,
            bootstrap_sql: None,
        },
        config,
        pending,
    )
    .expect("lead queue")
}

#[test]
fn submit_then_process_next_is_fifo() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let config = CoreConfig::default();
        let pending = std::sync::Arc::new(PendingResultManager::new());
        let queue = unconnectable_lead(&config, pending);

        let query = DatabaseQuery::new("q1", "SELECT 1", vec![]);
        queue.submit(query).expect("submit");
        assert_eq!(queue.depth(), 1);

        let popped = queue.process_next().expect("one pending query");
        assert_eq!(popped.query_id, "q1");
        assert_eq!(popped.sql, "SELECT 1");
        assert_eq!(queue.depth(), 0);
        assert!(queue.process_next().is_none());

        // Many submissions dequeue in submission order
        for i in 0..10 {
            queue
                .submit(DatabaseQuery::new(format!("q{i}"), "SELECT 1", vec![]))
                .expect("submit");
        }
        assert_eq!(queue.depth(), 10);
        for i in 0..10 {
            let q = queue.process_next().expect("pending query");
            assert_eq!(q.query_id, format!("q{i}"));
        }
        assert_eq!(queue.depth(), 0);

        queue.shutdown();
    });
    Ok(())
}

#[test]
fn concurrent_producers_never_lose_work() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let config = CoreConfig::default();
        let pending = std::sync::Arc::new(PendingResultManager::new());
        let queue = unconnectable_lead(&config, pending);

        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = std::sync::Arc::clone(&queue);
            producers.push(std::thread::spawn(move || {
                for i in 0..50 {
                    queue
                        .submit(DatabaseQuery::new(
                            format!("p{p}-q{i}"),
                            "SELECT 1",
                            vec![],
                        ))
                        .expect("submit");
                }
            }));
        }
        for producer in producers {
            producer.join().expect("producer thread");
        }
        assert_eq!(queue.depth(), 200);

        queue.shutdown();
    });
    Ok(())
}

#[test]
fn shutdown_refuses_new_work_and_fails_drained_queries()
-> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let config = CoreConfig::default();
        let pending = std::sync::Arc::new(PendingResultManager::new());
        let queue = unconnectable_lead(&config, std::sync::Arc::clone(&pending));

        pending
            .register("q-drained", std::time::Duration::from_secs(30))
            .expect("register");
        queue
            .submit(DatabaseQuery::new("q-drained", "SELECT 1", vec![]))
            .expect("submit");

        queue.shutdown();
        assert!(!queue.health_check());

        // Drained work completed its pending entry as a failure
        match pending.take("q-drained") {
            Some(ResultStatus::Complete(outcome)) => {
                assert!(!outcome.success);
                assert!(
                    outcome
                        .error_message
                        .as_deref()
                        .is_some_and(|m| m.contains("shut down"))
                );
            }
            other => panic!("expected failed completion, got {other:?}"),
        }

        // New submissions are refused
        let err = queue.submit(DatabaseQuery::new("late", "SELECT 1", vec![]));
        assert!(matches!(err, Err(SqlDispatchError::QueueShutDown(_))));
    });
    Ok(())
}
