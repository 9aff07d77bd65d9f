use async_trait::async_trait;

use crate::error::SqlDispatchError;
use crate::results::ResultSet;
use crate::types::{DatabaseType, RowValues};

/// The uniform contract every engine backend implements.
///
/// Queue, pool, and dispatch code is written against this trait only; the
/// four backends differ in driver plumbing, never in semantics. Prepared
/// execution carries both the cache key (`name`) and the SQL so a backend can
/// fall back to a fresh, uncached prepare when the cache cannot be used.
#[async_trait]
pub trait EngineExecutor {
    /// Open a transaction on this connection.
    async fn begin(&mut self) -> Result<(), SqlDispatchError>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<(), SqlDispatchError>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<(), SqlDispatchError>;

    /// Execute a multi-statement script. No parameters are supported.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlDispatchError>;

    /// Execute a row-returning statement.
    async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError>;

    /// Execute a DML statement, returning the affected-row count.
    async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError>;

    /// Compile `sql` and cache it under `name` in this connection's bounded
    /// statement cache. Returns `true` when the statement was already cached
    /// (a hit refreshes its recency). A compile failure leaves the cache
    /// untouched.
    async fn prepare(&mut self, name: &str, sql: &str) -> Result<bool, SqlDispatchError>;

    /// Execute a cached statement as a query. On a cache miss the statement
    /// is prepared fresh without being cached.
    async fn execute_prepared_select(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError>;

    /// Execute a cached statement as DML. Same cache-miss fallback as
    /// [`execute_prepared_select`](Self::execute_prepared_select).
    async fn execute_prepared_dml(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError>;

    /// Number of statements currently cached on this connection.
    async fn cached_statement_count(&mut self) -> usize;
}

/// One live database connection: the engine-specific handle plus its
/// prepared-statement cache, behind a single enum so pools and queues stay
/// engine-agnostic.
pub enum EngineConnection {
    #[cfg(feature = "postgres")]
    Postgres(crate::postgres::PostgresConnection),
    #[cfg(feature = "mysql")]
    MySql(crate::mysql::MySqlConnection),
    #[cfg(feature = "sqlite")]
    Sqlite(crate::sqlite::SqliteConnection),
    #[cfg(feature = "db2")]
    Db2(crate::db2::Db2Connection),
}

// Manual Debug: driver handles don't all implement it
impl std::fmt::Debug for EngineConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => f.debug_tuple("Postgres").finish(),
            #[cfg(feature = "mysql")]
            Self::MySql(_) => f.debug_tuple("MySql").finish(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => f.debug_tuple("Sqlite").field(conn).finish(),
            #[cfg(feature = "db2")]
            Self::Db2(_) => f.debug_tuple("Db2").finish(),
        }
    }
}

impl EngineConnection {
    /// Open a connection to `engine` at `connection_string`, with a
    /// prepared-statement cache of `cache_capacity` slots (0 = default).
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConnectionError` (or a transparent driver
    /// error) if the connection cannot be established.
    pub async fn connect(
        engine: DatabaseType,
        connection_string: &str,
        cache_capacity: usize,
    ) -> Result<Self, SqlDispatchError> {
        match engine {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Ok(Self::Postgres(
                crate::postgres::PostgresConnection::connect(connection_string, cache_capacity)
                    .await?,
            )),
            #[cfg(feature = "mysql")]
            DatabaseType::MySql => Ok(Self::MySql(
                crate::mysql::MySqlConnection::connect(connection_string, cache_capacity).await?,
            )),
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(Self::Sqlite(crate::sqlite::SqliteConnection::connect(
                connection_string,
                cache_capacity,
            )?)),
            #[cfg(feature = "db2")]
            DatabaseType::Db2 => Ok(Self::Db2(crate::db2::Db2Connection::connect(
                connection_string,
                cache_capacity,
            )?)),
        }
    }

    /// The engine this connection talks to.
    #[must_use]
    pub fn engine(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => DatabaseType::Postgres,
            #[cfg(feature = "mysql")]
            Self::MySql(_) => DatabaseType::MySql,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => DatabaseType::Sqlite,
            #[cfg(feature = "db2")]
            Self::Db2(_) => DatabaseType::Db2,
        }
    }
}

macro_rules! delegate {
    ($self:ident, $conn:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "postgres")]
            EngineConnection::Postgres($conn) => $body,
            #[cfg(feature = "mysql")]
            EngineConnection::MySql($conn) => $body,
            #[cfg(feature = "sqlite")]
            EngineConnection::Sqlite($conn) => $body,
            #[cfg(feature = "db2")]
            EngineConnection::Db2($conn) => $body,
        }
    };
}

// Calls are trait-qualified: some backends also expose same-named inherent
// methods with driver-native signatures, which would otherwise win method
// resolution.
#[async_trait]
impl EngineExecutor for EngineConnection {
    async fn begin(&mut self) -> Result<(), SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::begin(conn).await)
    }

    async fn commit(&mut self) -> Result<(), SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::commit(conn).await)
    }

    async fn rollback(&mut self) -> Result<(), SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::rollback(conn).await)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::execute_batch(conn, sql).await)
    }

    async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::execute_select(conn, sql, params).await)
    }

    async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::execute_dml(conn, sql, params).await)
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<bool, SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::prepare(conn, name, sql).await)
    }

    async fn execute_prepared_select(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::execute_prepared_select(conn, name, sql, params).await)
    }

    async fn execute_prepared_dml(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        delegate!(self, conn => EngineExecutor::execute_prepared_dml(conn, name, sql, params).await)
    }

    async fn cached_statement_count(&mut self) -> usize {
        delegate!(self, conn => EngineExecutor::cached_statement_count(conn).await)
    }
}
