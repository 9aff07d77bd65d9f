use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

/// Error type shared by every layer of the dispatch core.
///
/// Driver errors pass through transparently; everything the core itself can
/// detect maps to one of the string-carrying variants below. Callers decide
/// retry behavior from the variant: `PoolExhausted` and `CapacityExceeded`
/// are transient, `ConnectionError` discards the pooled connection, the rest
/// are reported per query.
#[derive(Debug, Error)]
pub enum SqlDispatchError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "mysql")]
    #[error(transparent)]
    MySqlError(#[from] mysql_async::Error),

    #[cfg(feature = "db2")]
    #[error(transparent)]
    Db2Error(#[from] odbc_api::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("connection pool for '{0}' is exhausted")]
    PoolExhausted(String),

    #[error("{0} is at capacity")]
    CapacityExceeded(String),

    #[error("queue for '{0}' is shutting down")]
    QueueShutDown(String),

    #[error("no database registered under '{0}'")]
    UnknownDatabase(String),

    #[error("query id '{0}' is already registered")]
    DuplicateQueryId(String),

    #[error("query id '{0}' is not registered")]
    NotRegistered(String),

    #[error("result for query id '{0}' expired before completion")]
    ResultExpired(String),

    #[error("query reference '{0}' not found in the query table")]
    QueryRefNotFound(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}
