use std::time::Duration;

/// Construction-time limits and thresholds for the dispatch core.
///
/// Every component takes the values it needs from an explicit `CoreConfig`
/// passed at construction; nothing reads ambient global state.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Maximum number of databases the queue manager will register.
    pub max_databases: usize,
    /// Maximum number of pools the pool manager will register.
    pub max_pools: usize,
    /// Maximum live connections per database pool.
    pub max_pool_size: usize,
    /// Per-connection prepared-statement cache capacity; `0` selects the
    /// default (see [`crate::statement_cache::DEFAULT_CACHE_CAPACITY`]).
    pub prepared_statement_cache_size: usize,
    /// Maximum worker queues a Lead queue may spawn.
    pub max_child_queues: usize,
    /// Idle age after which an unused pooled connection is eligible for
    /// removal by `cleanup_idle`.
    pub idle_connection_threshold: Duration,
    /// Timeout applied to pending results when the caller supplies none.
    pub default_query_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_databases: 16,
            max_pools: 16,
            max_pool_size: 10,
            prepared_statement_cache_size: 0,
            max_child_queues: 20,
            idle_connection_threshold: Duration::from_secs(300),
            default_query_timeout: Duration::from_secs(30),
        }
    }
}

impl CoreConfig {
    #[must_use]
    pub fn with_max_databases(mut self, max_databases: usize) -> Self {
        self.max_databases = max_databases;
        self
    }

    #[must_use]
    pub fn with_max_pools(mut self, max_pools: usize) -> Self {
        self.max_pools = max_pools;
        self
    }

    #[must_use]
    pub fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    #[must_use]
    pub fn with_statement_cache_size(mut self, size: usize) -> Self {
        self.prepared_statement_cache_size = size;
        self
    }

    #[must_use]
    pub fn with_max_child_queues(mut self, max_child_queues: usize) -> Self {
        self.max_child_queues = max_child_queues;
        self
    }

    #[must_use]
    pub fn with_idle_connection_threshold(mut self, threshold: Duration) -> Self {
        self.idle_connection_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_default_query_timeout(mut self, timeout: Duration) -> Self {
        self.default_query_timeout = timeout;
        self
    }
}
