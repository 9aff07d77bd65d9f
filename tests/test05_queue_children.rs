#![cfg(feature = "sqlite")]

use std::sync::Arc;

use sql_dispatch::prelude::*;

fn lead_for(
    name: &str,
    config: &CoreConfig,
    pending: Arc<PendingResultManager>,
) -> Arc<DatabaseQueue> {
    DatabaseQueue::create_lead(
        LeadQueueOptions {
            database_name: name.to_string(),
            connection_name: None,
            connection_string: "/nonexistent-dir/unused.sqlite".to_string(),
            engine: DatabaseType::Sqlite,
            bootstrap_sql: None,
        },
        config,
        pending,
    )
    .expect("lead queue")
}

#[tokio::test(flavor = "multi_thread")]
async fn child_spawning_is_bounded_and_kind_unique() {
    let config = CoreConfig::default().with_max_child_queues(2);
    let pending = Arc::new(PendingResultManager::new());
    let lead = lead_for("childdb", &config, pending);

    let slow = lead.spawn_child(QueueKind::Slow).expect("slow worker");
    assert_eq!(slow.kind(), QueueKind::Slow);
    assert_eq!(slow.database_name(), "childdb");
    assert!(!slow.can_spawn_queues());
    // Workers reference the lead's pool rather than owning one
    assert!(Arc::ptr_eq(lead.pool(), slow.pool()));

    // Duplicate kind is rejected
    assert!(matches!(
        lead.spawn_child(QueueKind::Slow),
        Err(SqlDispatchError::ConfigError(_))
    ));

    // Capacity (2) is enforced
    let _fast = lead.spawn_child(QueueKind::Fast).expect("fast worker");
    assert!(matches!(
        lead.spawn_child(QueueKind::Cache),
        Err(SqlDispatchError::CapacityExceeded(_))
    ));

    // Workers cannot spawn, and nobody spawns a second lead
    assert!(slow.spawn_child(QueueKind::Cache).is_err());
    assert!(lead.spawn_child(QueueKind::Lead).is_err());

    // Shutdown removes exactly the named kind
    lead.shutdown_child(QueueKind::Slow).expect("shutdown slow");
    assert!(lead.child(QueueKind::Slow).is_none());
    assert!(lead.child(QueueKind::Fast).is_some());
    assert!(matches!(
        lead.shutdown_child(QueueKind::Slow),
        Err(SqlDispatchError::ConfigError(_))
    ));

    lead.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn manager_registry_is_exact_match_and_bounded() {
    let config = CoreConfig::default();
    let pending = Arc::new(PendingResultManager::new());

    assert!(DatabaseQueueManager::new(0).is_err());
    let manager = DatabaseQueueManager::new(2).expect("manager");

    let alpha = lead_for("alpha", &config, Arc::clone(&pending));
    let beta = lead_for("beta", &config, Arc::clone(&pending));
    manager.add_database(Arc::clone(&alpha)).expect("alpha");
    manager.add_database(Arc::clone(&beta)).expect("beta");

    let found = manager.get_database("alpha").expect("alpha resolves");
    assert!(Arc::ptr_eq(&found, &alpha));
    assert!(manager.get_database("gamma").is_none());
    assert!(manager.get_database("ALPHA").is_none());

    // Duplicate names and over-capacity registrations are rejected
    let alpha2 = lead_for("alpha", &config, Arc::clone(&pending));
    assert!(matches!(
        manager.add_database(alpha2),
        Err(SqlDispatchError::ConfigError(_))
    ));
    // (capacity is 2 and both slots are taken)
    let gamma = lead_for("gamma", &config, Arc::clone(&pending));
    assert!(matches!(
        manager.add_database(gamma),
        Err(SqlDispatchError::CapacityExceeded(_))
    ));

    assert_eq!(manager.count(), 2);
    manager.shutdown_all();
    assert_eq!(manager.count(), 0);
}
