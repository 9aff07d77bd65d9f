use rusqlite::Connection;

use crate::error::SqlDispatchError;

/// Open a `SQLite` database file (or `:memory:`) and apply the connection
/// defaults this core relies on.
pub(crate) fn open_connection(
    path: &str,
    statement_cache_capacity: usize,
) -> Result<Connection, SqlDispatchError> {
    let conn = Connection::open(path).map_err(|e| {
        SqlDispatchError::ConnectionError(format!("failed to open sqlite database '{path}': {e}"))
    })?;

    // WAL keeps readers from blocking the writer; irrelevant (and harmless)
    // for in-memory databases.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");

    // Size the driver's own compiled-statement cache to match ours so an
    // entry we consider live is never silently recompiled.
    conn.set_prepared_statement_cache_capacity(statement_cache_capacity);

    Ok(conn)
}
