use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::error::SqlDispatchError;
use crate::queue::DatabaseQueue;

/// Top-level registry mapping database name to its Lead queue.
///
/// Bounded at construction; dropping the manager cascades shutdown to every
/// registered queue (and, through each Lead, its workers and pool).
pub struct DatabaseQueueManager {
    max_databases: usize,
    queues: Mutex<Vec<Arc<DatabaseQueue>>>,
}

impl DatabaseQueueManager {
    /// Create an empty registry.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` if `max_databases` is zero.
    pub fn new(max_databases: usize) -> Result<Self, SqlDispatchError> {
        if max_databases == 0 {
            return Err(SqlDispatchError::ConfigError(
                "queue manager needs a max_databases of at least 1".into(),
            ));
        }
        Ok(Self {
            max_databases,
            queues: Mutex::new(Vec::new()),
        })
    }

    fn lock_queues(&self) -> std::sync::MutexGuard<'_, Vec<Arc<DatabaseQueue>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a Lead queue.
    ///
    /// # Errors
    /// `CapacityExceeded` when the registry is full, `ConfigError` when the
    /// database name is already registered (a duplicate would be shadowed by
    /// exact-match lookup forever).
    pub fn add_database(&self, queue: Arc<DatabaseQueue>) -> Result<(), SqlDispatchError> {
        let mut queues = self.lock_queues();
        if queues
            .iter()
            .any(|existing| existing.database_name() == queue.database_name())
        {
            return Err(SqlDispatchError::ConfigError(format!(
                "database '{}' is already registered",
                queue.database_name()
            )));
        }
        if queues.len() >= self.max_databases {
            return Err(SqlDispatchError::CapacityExceeded(
                "database queue manager".into(),
            ));
        }
        info!(database = %queue.database_name(), "database registered");
        queues.push(queue);
        Ok(())
    }

    /// Exact-match lookup by database name. The connection-name fallback some
    /// callers want lives at the dispatch boundary, not here.
    #[must_use]
    pub fn get_database(&self, database_name: &str) -> Option<Arc<DatabaseQueue>> {
        self.lock_queues()
            .iter()
            .find(|queue| queue.database_name() == database_name)
            .cloned()
    }

    /// Registered queues in insertion order, for caller-side scans.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<DatabaseQueue>> {
        self.lock_queues().clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.lock_queues().len()
    }

    /// Shut down every registered queue and empty the registry.
    pub fn shutdown_all(&self) {
        let queues: Vec<Arc<DatabaseQueue>> = {
            let mut guard = self.lock_queues();
            guard.drain(..).collect()
        };
        for queue in queues {
            queue.shutdown();
        }
    }
}

impl Drop for DatabaseQueueManager {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
