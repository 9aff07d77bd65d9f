use std::sync::{Arc, OnceLock};

use odbc_api::{Connection, ConnectionOptions, Environment};

use crate::error::SqlDispatchError;
use crate::statement_cache::StatementCache;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// Process-wide ODBC environment. Connections borrow it, so it lives for the
/// life of the process once the first Db2 connection is opened.
fn environment() -> Result<&'static Environment, SqlDispatchError> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| {
        SqlDispatchError::ConnectionError(format!("failed to create ODBC environment: {e}"))
    })?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// A live Db2 connection over ODBC, plus its bounded prepared-statement
/// cache.
///
/// ODBC prepared handles borrow the connection, so — like the SQL Server
/// backends this core's lineage supports — the cached handle is the SQL text
/// and each prepared execution re-binds against the same connection. That
/// keeps the cache contract identical across engines without amortizing
/// server-side compilation. All ODBC I/O is blocking; these connections are
/// meant to be driven from a queue's dedicated worker thread.
pub struct Db2Connection {
    pub(crate) conn: Connection<'static>,
    pub(crate) statements: StatementCache<Arc<String>>,
    pub(crate) in_transaction: bool,
}

impl Drop for Db2Connection {
    fn drop(&mut self) {
        // An open unit of work must not leak into the next owner of the
        // underlying ODBC session.
        if self.in_transaction {
            let _ = self.conn.rollback();
        }
    }
}

impl Db2Connection {
    /// Connect using an ODBC connection string
    /// (`Driver={IBM DB2 ODBC DRIVER};Hostname=...;Database=...;...`).
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConnectionError` if the environment or the
    /// connection cannot be established.
    pub fn connect(
        connection_string: &str,
        cache_capacity: usize,
    ) -> Result<Self, SqlDispatchError> {
        let conn = environment()?
            .connect_with_connection_string(connection_string, ConnectionOptions::default())
            .map_err(|e| {
                SqlDispatchError::ConnectionError(format!("db2 connection failed: {e}"))
            })?;
        Ok(Self {
            conn,
            statements: StatementCache::new(cache_capacity),
            in_transaction: false,
        })
    }
}
