mod manager;

pub use manager::ConnectionPoolManager;

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::SqlDispatchError;
use crate::executor::EngineConnection;
use crate::types::DatabaseType;

/// Per-database pool of reusable engine connections.
///
/// Entries live in one vec under one lock; the critical sections are array
/// scans only. A checkout moves the connection into an RAII
/// [`PooledConnection`] guard and leaves the entry marked `in_use`; the guard
/// checks it back in (or removes the entry entirely, for connections a severe
/// error has poisoned) on drop. Establishing a new connection happens outside
/// the lock against a reserved placeholder slot, so `size ≤ max_size` holds
/// even while many callers connect concurrently.
pub struct ConnectionPool {
    database_name: String,
    engine: DatabaseType,
    connection_string: String,
    max_size: usize,
    statement_cache_capacity: usize,
    entries: Mutex<Vec<PoolEntry>>,
    entry_seq: AtomicU64,
}

struct PoolEntry {
    id: u64,
    /// Present while the entry is idle; taken while checked out.
    conn: Option<EngineConnection>,
    /// Hash of the connection string the entry was opened with.
    conn_hash: u64,
    in_use: bool,
    created_at: Instant,
    last_used: Instant,
}

impl std::fmt::Debug for PoolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEntry")
            .field("id", &self.id)
            .field("conn_hash", &self.conn_hash)
            .field("in_use", &self.in_use)
            .field("age_secs", &self.created_at.elapsed().as_secs())
            .field("idle_secs", &self.last_used.elapsed().as_secs())
            .finish()
    }
}

impl ConnectionPool {
    /// Create an empty pool.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` if `max_size` is zero or the
    /// database name is empty.
    pub fn new(
        database_name: impl Into<String>,
        engine: DatabaseType,
        connection_string: impl Into<String>,
        max_size: usize,
        statement_cache_capacity: usize,
    ) -> Result<Arc<Self>, SqlDispatchError> {
        let database_name = database_name.into();
        if database_name.is_empty() {
            return Err(SqlDispatchError::ConfigError(
                "pool database name must not be empty".into(),
            ));
        }
        if max_size == 0 {
            return Err(SqlDispatchError::ConfigError(format!(
                "pool for '{database_name}' needs a max_size of at least 1"
            )));
        }
        Ok(Arc::new(Self {
            database_name,
            engine,
            connection_string: connection_string.into(),
            max_size,
            statement_cache_capacity,
            entries: Mutex::new(Vec::new()),
            entry_seq: AtomicU64::new(0),
        }))
    }

    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    #[must_use]
    pub fn engine(&self) -> DatabaseType {
        self.engine
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Current number of entries (idle + checked out + connecting).
    #[must_use]
    pub fn size(&self) -> usize {
        self.lock_entries().len()
    }

    /// Number of entries currently checked out or being established.
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.lock_entries().iter().filter(|e| e.in_use).count()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<PoolEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hash_connection_string(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.connection_string.hash(&mut hasher);
        hasher.finish()
    }

    /// Check out a connection, reusing an idle entry or opening a new one if
    /// the pool has spare capacity.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::PoolExhausted` when every slot is taken
    /// (retryable), or the connect error if a fresh connection fails.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, SqlDispatchError> {
        let reserved_id = {
            let now = Instant::now();
            let mut entries = self.lock_entries();
            if let Some(entry) = entries.iter_mut().find(|e| !e.in_use && e.conn.is_some()) {
                entry.in_use = true;
                entry.last_used = now;
                let conn = entry.conn.take();
                return Ok(PooledConnection {
                    pool: Arc::clone(self),
                    entry_id: entry.id,
                    conn,
                    discard: false,
                });
            }
            if entries.len() >= self.max_size {
                return Err(SqlDispatchError::PoolExhausted(self.database_name.clone()));
            }
            // Reserve the slot before connecting so concurrent acquires
            // can't push the pool past max_size.
            let id = self.entry_seq.fetch_add(1, Ordering::Relaxed);
            entries.push(PoolEntry {
                id,
                conn: None,
                conn_hash: self.hash_connection_string(),
                in_use: true,
                created_at: now,
                last_used: now,
            });
            id
        };

        match EngineConnection::connect(
            self.engine,
            &self.connection_string,
            self.statement_cache_capacity,
        )
        .await
        {
            Ok(conn) => {
                tracing::debug!(
                    database = %self.database_name,
                    engine = self.engine.as_str(),
                    pool_size = self.size(),
                    "opened new pooled connection"
                );
                Ok(PooledConnection {
                    pool: Arc::clone(self),
                    entry_id: reserved_id,
                    conn: Some(conn),
                    discard: false,
                })
            }
            Err(e) => {
                self.lock_entries().retain(|entry| entry.id != reserved_id);
                Err(e)
            }
        }
    }

    fn check_in(&self, entry_id: u64, conn: Option<EngineConnection>, discard: bool) {
        let mut entries = self.lock_entries();
        if discard || conn.is_none() {
            entries.retain(|entry| entry.id != entry_id);
            tracing::debug!(
                database = %self.database_name,
                entry_id,
                "discarded pooled connection"
            );
            return;
        }
        if let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) {
            entry.conn = conn;
            entry.in_use = false;
            entry.last_used = Instant::now();
        }
    }

    /// Remove idle entries unused for longer than `idle_threshold`.
    ///
    /// Entries that are `in_use` (or currently connecting) are never touched,
    /// regardless of age. Returns the number of entries removed.
    pub fn cleanup_idle(&self, idle_threshold: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|entry| {
            entry.in_use || now.duration_since(entry.last_used) <= idle_threshold
        });
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(
                database = %self.database_name,
                removed,
                remaining = entries.len(),
                "evicted idle pooled connections"
            );
        }
        removed
    }

    #[cfg(test)]
    fn seed_entry_for_test(&self, in_use: bool, idle_for: Duration) -> u64 {
        let now = Instant::now();
        let past = now.checked_sub(idle_for).unwrap_or(now);
        let id = self.entry_seq.fetch_add(1, Ordering::Relaxed);
        self.lock_entries().push(PoolEntry {
            id,
            conn: None,
            conn_hash: self.hash_connection_string(),
            in_use,
            created_at: past,
            last_used: past,
        });
        id
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("database_name", &self.database_name)
            .field("engine", &self.engine.as_str())
            .field("max_size", &self.max_size)
            .field("size", &self.size())
            .finish()
    }
}

/// RAII guard for a checked-out connection; returns it to the pool on drop,
/// or removes the entry when marked for discard.
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    entry_id: u64,
    conn: Option<EngineConnection>,
    discard: bool,
}

impl PooledConnection {
    /// The live connection behind this guard.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConnectionError` if the connection was
    /// already returned (cannot happen before drop).
    pub fn executor(&mut self) -> Result<&mut EngineConnection, SqlDispatchError> {
        self.conn.as_mut().ok_or_else(|| {
            SqlDispatchError::ConnectionError("pooled connection already returned".into())
        })
    }

    /// The engine this connection talks to, if it is still held.
    #[must_use]
    pub fn engine(&self) -> Option<DatabaseType> {
        self.conn.as_ref().map(EngineConnection::engine)
    }

    /// Mark the connection as broken; drop will remove the pool entry
    /// instead of returning it.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = self.conn.take();
        self.pool.check_in(self.entry_id, conn, self.discard);
    }
}
