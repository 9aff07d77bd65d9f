use tokio_postgres::{Client, NoTls, Statement};

use crate::error::SqlDispatchError;
use crate::statement_cache::StatementCache;

/// A live `PostgreSQL` connection: the client plus its bounded
/// prepared-statement cache. The driver's connection task is spawned onto the
/// current runtime and winds down when the client drops.
pub struct PostgresConnection {
    pub(crate) client: Client,
    pub(crate) statements: StatementCache<Statement>,
}

impl PostgresConnection {
    /// Connect using a `tokio-postgres` connection string
    /// (`host=... user=... dbname=...` or a `postgres://` URL).
    ///
    /// Must be called from within a tokio runtime; the connection's I/O task
    /// is spawned there.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConnectionError` if the connection string
    /// cannot be parsed or the server cannot be reached.
    pub async fn connect(
        connection_string: &str,
        cache_capacity: usize,
    ) -> Result<Self, SqlDispatchError> {
        let config: tokio_postgres::Config = connection_string.parse().map_err(|e| {
            SqlDispatchError::ConnectionError(format!("invalid postgres connection string: {e}"))
        })?;

        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            SqlDispatchError::ConnectionError(format!("postgres connection failed: {e}"))
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection task ended with error");
            }
        });

        Ok(Self {
            client,
            statements: StatementCache::new(cache_capacity),
        })
    }
}
