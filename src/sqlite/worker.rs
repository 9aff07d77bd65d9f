use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use rusqlite::ToSql;
use tokio::sync::oneshot;

use crate::error::SqlDispatchError;
use crate::results::ResultSet;
use crate::statement_cache::StatementCache;

use super::config::open_connection;
use super::query::build_result_set;

static WORKER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Owned `SQLite` connection backed by a dedicated worker thread.
///
/// rusqlite connections are not `Sync` and their compiled statements borrow
/// the connection, so all access funnels through one thread that owns both
/// the connection and its statement cache. Dropping the handle shuts the
/// worker down.
pub struct SqliteConnection {
    sender: Sender<Command>,
    path: String,
}

impl SqliteConnection {
    /// Open the database and spawn its worker thread.
    ///
    /// # Errors
    /// Returns [`SqlDispatchError`] if the database cannot be opened or the
    /// worker thread cannot be spawned.
    pub fn connect(path: &str, cache_capacity: usize) -> Result<Self, SqlDispatchError> {
        let driver_cache_capacity = if cache_capacity == 0 {
            crate::statement_cache::DEFAULT_CACHE_CAPACITY
        } else {
            cache_capacity
        };
        let conn = open_connection(path, driver_cache_capacity)?;
        let (sender, receiver) = mpsc::channel::<Command>();
        let seq = WORKER_SEQ.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(format!("sqlite-conn-{seq}"))
            .spawn(move || run_sqlite_worker(conn, cache_capacity, &receiver))
            .map_err(|err| {
                SqlDispatchError::ConnectionError(format!(
                    "failed to spawn SQLite worker thread: {err}"
                ))
            })?;

        Ok(Self {
            sender,
            path: path.to_owned(),
        })
    }

    fn send_command(&self, command: Command) -> Result<(), SqlDispatchError> {
        self.sender
            .send(command)
            .map_err(|_| SqlDispatchError::ConnectionError("SQLite worker closed".into()))
    }

    async fn roundtrip<T>(
        &self,
        command: Command,
        rx: oneshot::Receiver<Result<T, SqlDispatchError>>,
        while_doing: &str,
    ) -> Result<T, SqlDispatchError> {
        self.send_command(command)?;
        rx.await.map_err(|_| {
            SqlDispatchError::ConnectionError(format!("SQLite worker dropped while {while_doing}"))
        })?
    }

    /// Execute a batch of SQL statements on the worker-owned connection.
    ///
    /// # Errors
    /// Propagates any [`SqlDispatchError`] from the worker.
    pub async fn execute_batch(&self, sql: String) -> Result<(), SqlDispatchError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            Command::Batch {
                sql,
                respond_to: tx,
            },
            rx,
            "executing batch",
        )
        .await
    }

    /// Execute a SQL query and return the materialized rows.
    ///
    /// # Errors
    /// Propagates any [`SqlDispatchError`] from the worker.
    pub async fn execute_select(
        &self,
        sql: String,
        params: Vec<rusqlite::types::Value>,
    ) -> Result<ResultSet, SqlDispatchError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            Command::Select {
                sql,
                params,
                respond_to: tx,
            },
            rx,
            "executing select",
        )
        .await
    }

    /// Execute a DML statement and return the affected row count.
    ///
    /// # Errors
    /// Propagates any [`SqlDispatchError`] from the worker.
    pub async fn execute_dml(
        &self,
        sql: String,
        params: Vec<rusqlite::types::Value>,
    ) -> Result<usize, SqlDispatchError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            Command::Dml {
                sql,
                params,
                respond_to: tx,
            },
            rx,
            "executing dml",
        )
        .await
    }

    /// Compile and cache a statement under `name`. Returns `true` on a cache
    /// hit.
    ///
    /// # Errors
    /// Propagates any [`SqlDispatchError`] from the worker.
    pub async fn prepare(&self, name: String, sql: String) -> Result<bool, SqlDispatchError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            Command::Prepare {
                name,
                sql,
                respond_to: tx,
            },
            rx,
            "preparing statement",
        )
        .await
    }

    /// Execute a cached statement as a query; a miss prepares fresh without
    /// caching.
    ///
    /// # Errors
    /// Propagates any [`SqlDispatchError`] from the worker.
    pub async fn execute_prepared_select(
        &self,
        name: String,
        sql: String,
        params: Vec<rusqlite::types::Value>,
    ) -> Result<ResultSet, SqlDispatchError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            Command::PreparedSelect {
                name,
                sql,
                params,
                respond_to: tx,
            },
            rx,
            "executing prepared select",
        )
        .await
    }

    /// Execute a cached statement as DML; a miss prepares fresh without
    /// caching.
    ///
    /// # Errors
    /// Propagates any [`SqlDispatchError`] from the worker.
    pub async fn execute_prepared_dml(
        &self,
        name: String,
        sql: String,
        params: Vec<rusqlite::types::Value>,
    ) -> Result<usize, SqlDispatchError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            Command::PreparedDml {
                name,
                sql,
                params,
                respond_to: tx,
            },
            rx,
            "executing prepared dml",
        )
        .await
    }

    /// Number of statements in the worker's cache.
    pub async fn cached_statement_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.send_command(Command::CachedCount { respond_to: tx }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

enum Command {
    Batch {
        sql: String,
        respond_to: oneshot::Sender<Result<(), SqlDispatchError>>,
    },
    Select {
        sql: String,
        params: Vec<rusqlite::types::Value>,
        respond_to: oneshot::Sender<Result<ResultSet, SqlDispatchError>>,
    },
    Dml {
        sql: String,
        params: Vec<rusqlite::types::Value>,
        respond_to: oneshot::Sender<Result<usize, SqlDispatchError>>,
    },
    Prepare {
        name: String,
        sql: String,
        respond_to: oneshot::Sender<Result<bool, SqlDispatchError>>,
    },
    PreparedSelect {
        name: String,
        sql: String,
        params: Vec<rusqlite::types::Value>,
        respond_to: oneshot::Sender<Result<ResultSet, SqlDispatchError>>,
    },
    PreparedDml {
        name: String,
        sql: String,
        params: Vec<rusqlite::types::Value>,
        respond_to: oneshot::Sender<Result<usize, SqlDispatchError>>,
    },
    CachedCount {
        respond_to: oneshot::Sender<usize>,
    },
    Shutdown,
}

fn run_sqlite_worker(
    mut conn: rusqlite::Connection,
    cache_capacity: usize,
    receiver: &Receiver<Command>,
) {
    // The cache handle is the validated SQL; rusqlite's own statement cache
    // (sized to match in `open_connection`) holds the compiled object, so an
    // evicted handle just drops.
    let mut statements: StatementCache<Arc<String>> = StatementCache::new(cache_capacity);

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Batch { sql, respond_to } => {
                let outcome = conn.execute_batch(&sql).map_err(SqlDispatchError::from);
                let _ = respond_to.send(outcome);
            }
            Command::Select {
                sql,
                params,
                respond_to,
            } => {
                let outcome = run_select(&mut conn, &sql, &params, false);
                let _ = respond_to.send(outcome);
            }
            Command::Dml {
                sql,
                params,
                respond_to,
            } => {
                let outcome = run_dml(&mut conn, &sql, &params, false);
                let _ = respond_to.send(outcome);
            }
            Command::Prepare {
                name,
                sql,
                respond_to,
            } => {
                let outcome = if statements.get_matching(&name, &sql).is_some() {
                    Ok(true)
                } else {
                    // Validate by compiling before touching the cache; a
                    // failed prepare leaves it unchanged.
                    match conn.prepare_cached(&sql) {
                        Ok(stmt) => {
                            drop(stmt);
                            let handle = Arc::new(sql.clone());
                            let _evicted = statements.insert(&name, &sql, handle);
                            Ok(false)
                        }
                        Err(e) => Err(SqlDispatchError::from(e)),
                    }
                };
                let _ = respond_to.send(outcome);
            }
            Command::PreparedSelect {
                name,
                sql,
                params,
                respond_to,
            } => {
                let hit = statements.get_matching(&name, &sql).is_some();
                let outcome = run_select(&mut conn, &sql, &params, hit);
                let _ = respond_to.send(outcome);
            }
            Command::PreparedDml {
                name,
                sql,
                params,
                respond_to,
            } => {
                let hit = statements.get_matching(&name, &sql).is_some();
                let outcome = run_dml(&mut conn, &sql, &params, hit);
                let _ = respond_to.send(outcome);
            }
            Command::CachedCount { respond_to } => {
                let _ = respond_to.send(statements.len());
            }
            Command::Shutdown => break,
        }
    }
}

fn run_select(
    conn: &mut rusqlite::Connection,
    sql: &str,
    params: &[rusqlite::types::Value],
    cached: bool,
) -> Result<ResultSet, SqlDispatchError> {
    if cached {
        let mut stmt = conn.prepare_cached(sql)?;
        build_result_set(&mut stmt, params)
    } else {
        let mut stmt = conn.prepare(sql)?;
        build_result_set(&mut stmt, params)
    }
}

fn run_dml(
    conn: &mut rusqlite::Connection,
    sql: &str,
    params: &[rusqlite::types::Value],
    cached: bool,
) -> Result<usize, SqlDispatchError> {
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|value| value as &dyn ToSql).collect();
    let rows_affected = if cached {
        let mut stmt = conn.prepare_cached(sql)?;
        stmt.execute(&param_refs[..])?
    } else {
        let mut stmt = conn.prepare(sql)?;
        stmt.execute(&param_refs[..])?
    };
    Ok(rows_affected)
}
