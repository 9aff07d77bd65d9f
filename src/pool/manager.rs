use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SqlDispatchError;

use super::ConnectionPool;

/// Fixed-capacity registry of connection pools, looked up by database name
/// with a linear scan.
pub struct ConnectionPoolManager {
    max_pools: usize,
    pools: Mutex<Vec<Arc<ConnectionPool>>>,
}

impl ConnectionPoolManager {
    /// Create an empty manager.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` if `max_pools` is zero.
    pub fn new(max_pools: usize) -> Result<Self, SqlDispatchError> {
        if max_pools == 0 {
            return Err(SqlDispatchError::ConfigError(
                "pool manager needs a max_pools of at least 1".into(),
            ));
        }
        Ok(Self {
            max_pools,
            pools: Mutex::new(Vec::new()),
        })
    }

    fn lock_pools(&self) -> std::sync::MutexGuard<'_, Vec<Arc<ConnectionPool>>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pool.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::CapacityExceeded` when the registry is
    /// full.
    pub fn add_pool(&self, pool: Arc<ConnectionPool>) -> Result<(), SqlDispatchError> {
        let mut pools = self.lock_pools();
        if pools.len() >= self.max_pools {
            return Err(SqlDispatchError::CapacityExceeded(
                "connection pool manager".into(),
            ));
        }
        pools.push(pool);
        Ok(())
    }

    /// Find a pool by database name; first match wins.
    #[must_use]
    pub fn get_pool(&self, database_name: &str) -> Option<Arc<ConnectionPool>> {
        self.lock_pools()
            .iter()
            .find(|pool| pool.database_name() == database_name)
            .cloned()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.lock_pools().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DatabaseType;

    #[test]
    fn zero_capacity_manager_is_rejected() {
        assert!(ConnectionPoolManager::new(0).is_err());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn lookup_finds_exact_name_only() {
        let manager = ConnectionPoolManager::new(2).expect("manager");
        let pool = ConnectionPool::new("alpha", DatabaseType::Sqlite, ":memory:", 2, 10)
            .expect("pool");
        manager.add_pool(pool).expect("registered");

        assert!(manager.get_pool("alpha").is_some());
        assert!(manager.get_pool("beta").is_none());
        assert_eq!(manager.count(), 1);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn capacity_is_enforced() {
        let manager = ConnectionPoolManager::new(1).expect("manager");
        let a = ConnectionPool::new("a", DatabaseType::Sqlite, ":memory:", 1, 10).expect("pool");
        let b = ConnectionPool::new("b", DatabaseType::Sqlite, ":memory:", 1, 10).expect("pool");
        manager.add_pool(a).expect("first pool fits");
        assert!(matches!(
            manager.add_pool(b),
            Err(SqlDispatchError::CapacityExceeded(_))
        ));
    }
}
