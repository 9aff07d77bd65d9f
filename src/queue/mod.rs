//! Per-database work queues: a Lead queue per database that owns the
//! connection pool and may spawn specialized worker queues, each with its own
//! dedicated OS thread pulling work FIFO.

mod kind;

pub use kind::QueueKind;

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::SqlDispatchError;
use crate::executor::EngineExecutor;
use crate::pending::PendingResultManager;
use crate::pool::ConnectionPool;
use crate::query::{DatabaseQuery, QueryOperation, QueryOutcome};
use crate::translation::{placeholder_style, translate_placeholders};
use crate::types::DatabaseType;

/// How long an idle worker sleeps between shutdown checks; idle Leads run
/// pool cleanup on this tick.
const IDLE_TICK: Duration = Duration::from_secs(1);

/// Identity for a new Lead queue.
#[derive(Debug, Clone)]
pub struct LeadQueueOptions {
    pub database_name: String,
    /// Optional alias callers may resolve the database by.
    pub connection_name: Option<String>,
    pub connection_string: String,
    pub engine: DatabaseType,
    /// Script run once on the first successful connection, before the queue
    /// reports ready.
    pub bootstrap_sql: Option<String>,
}

/// The sync primitives one queue needs, constructed as a unit.
///
/// Producers push under `work` and signal `work_available`; the ready gate
/// covers both the initial connection and bootstrap completion so dependents
/// can block without busy-waiting.
struct QueueSync {
    work: Mutex<VecDeque<DatabaseQuery>>,
    work_available: Condvar,
    shutting_down: AtomicBool,
    ready: Mutex<ReadyState>,
    ready_changed: Condvar,
    processed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ReadyState {
    connected: bool,
    bootstrapped: bool,
}

impl QueueSync {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            work: Mutex::new(VecDeque::new()),
            work_available: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            ready: Mutex::new(ReadyState::default()),
            ready_changed: Condvar::new(),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    fn lock_work(&self) -> MutexGuard<'_, VecDeque<DatabaseQuery>> {
        self.work.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_ready(&self) -> MutexGuard<'_, ReadyState> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_connected(&self) {
        let mut ready = self.lock_ready();
        ready.connected = true;
        self.ready_changed.notify_all();
    }

    fn mark_ready(&self) {
        let mut ready = self.lock_ready();
        ready.connected = true;
        ready.bootstrapped = true;
        self.ready_changed.notify_all();
    }
}

/// A Lead or Worker queue for one database.
pub struct DatabaseQueue {
    database_name: String,
    connection_name: Option<String>,
    connection_string: String,
    kind: QueueKind,
    bootstrap_sql: Option<String>,
    can_spawn_queues: bool,
    max_children: usize,
    idle_threshold: Duration,
    pool: Arc<ConnectionPool>,
    pending: Arc<PendingResultManager>,
    runtime: Handle,
    statement_cache_capacity: usize,
    sync: Arc<QueueSync>,
    /// Lead-only: spawned workers, guarded independently of the work lock so
    /// spawn/shutdown never block submission.
    children: Mutex<Vec<Arc<DatabaseQueue>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DatabaseQueue {
    /// Create the Lead queue for a database: builds the connection pool,
    /// spawns the worker thread, and returns the only entry point for that
    /// database's work.
    ///
    /// Must be called from within a tokio runtime; the worker thread enters
    /// it to drive engine I/O. Construction is all-or-nothing: any failure
    /// leaves no partially constructed queue behind.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` when called outside a runtime
    /// or with an invalid pool configuration, and `ConnectionError` if the
    /// worker thread cannot be spawned.
    pub fn create_lead(
        opts: LeadQueueOptions,
        config: &CoreConfig,
        pending: Arc<PendingResultManager>,
    ) -> Result<Arc<Self>, SqlDispatchError> {
        let runtime = Handle::try_current().map_err(|_| {
            SqlDispatchError::ConfigError(
                "queue creation requires a running tokio runtime".into(),
            )
        })?;

        let pool = ConnectionPool::new(
            opts.database_name.clone(),
            opts.engine,
            opts.connection_string.clone(),
            config.max_pool_size,
            config.prepared_statement_cache_size,
        )?;

        let queue = Arc::new(Self {
            database_name: opts.database_name,
            connection_name: opts.connection_name,
            connection_string: opts.connection_string,
            kind: QueueKind::Lead,
            bootstrap_sql: opts.bootstrap_sql,
            can_spawn_queues: true,
            max_children: config.max_child_queues,
            idle_threshold: config.idle_connection_threshold,
            pool,
            pending,
            runtime,
            statement_cache_capacity: config.prepared_statement_cache_size,
            sync: QueueSync::new(),
            children: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
        });
        queue.spawn_worker_thread()?;
        Ok(queue)
    }

    /// Create a worker queue sharing the Lead's pool. Internal: workers come
    /// into existence through [`spawn_child`](Self::spawn_child).
    fn create_worker(lead: &Arc<Self>, kind: QueueKind) -> Result<Arc<Self>, SqlDispatchError> {
        let queue = Arc::new(Self {
            database_name: lead.database_name.clone(),
            connection_name: lead.connection_name.clone(),
            connection_string: lead.connection_string.clone(),
            kind,
            bootstrap_sql: None,
            can_spawn_queues: false,
            max_children: 0,
            idle_threshold: lead.idle_threshold,
            pool: Arc::clone(&lead.pool),
            pending: Arc::clone(&lead.pending),
            runtime: lead.runtime.clone(),
            statement_cache_capacity: lead.statement_cache_capacity,
            sync: QueueSync::new(),
            children: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
        });
        queue.spawn_worker_thread()?;
        Ok(queue)
    }

    fn spawn_worker_thread(self: &Arc<Self>) -> Result<(), SqlDispatchError> {
        let ctx = WorkerContext {
            database_name: self.database_name.clone(),
            kind: self.kind,
            bootstrap_sql: self.bootstrap_sql.clone(),
            is_lead: self.kind == QueueKind::Lead,
            idle_threshold: self.idle_threshold,
            sync: Arc::clone(&self.sync),
            pool: Arc::clone(&self.pool),
            pending: Arc::clone(&self.pending),
            runtime: self.runtime.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("dbqueue-{}-{}", self.database_name, self.kind))
            .spawn(move || run_queue_worker(&ctx))
            .map_err(|err| {
                SqlDispatchError::ConnectionError(format!(
                    "failed to spawn queue worker thread: {err}"
                ))
            })?;
        *self.lock_worker() = Some(handle);
        Ok(())
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<thread::JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_children(&self) -> MutexGuard<'_, Vec<Arc<DatabaseQueue>>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    #[must_use]
    pub fn connection_name(&self) -> Option<&str> {
        self.connection_name.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    #[must_use]
    pub fn can_spawn_queues(&self) -> bool {
        self.can_spawn_queues
    }

    /// The pool this queue executes against (Leads own it, workers share the
    /// Lead's).
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Append a query to the pending-work list and signal the worker.
    /// Thread-safe for any number of concurrent producers; the critical
    /// section is an append plus a notify.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::QueueShutDown` once shutdown has started.
    pub fn submit(&self, query: DatabaseQuery) -> Result<(), SqlDispatchError> {
        if self.sync.shutting_down.load(Ordering::Acquire) {
            return Err(SqlDispatchError::QueueShutDown(self.database_name.clone()));
        }
        let mut work = self.sync.lock_work();
        work.push_back(query);
        self.sync.work_available.notify_one();
        Ok(())
    }

    /// Pop the oldest pending query (FIFO). Meant for the queue's own worker
    /// thread and for tests; returns `None` when the queue is empty.
    #[must_use]
    pub fn process_next(&self) -> Option<DatabaseQuery> {
        self.sync.lock_work().pop_front()
    }

    /// Current pending-work count.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.sync.lock_work().len()
    }

    /// Whether this queue can currently accept work: not shutting down and
    /// its worker thread is alive.
    #[must_use]
    pub fn health_check(&self) -> bool {
        if self.sync.shutting_down.load(Ordering::Acquire) {
            return false;
        }
        self.lock_worker()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Block until the first connection (and bootstrap, if any) succeeded,
    /// or `timeout` elapses. Returns whether the queue became ready.
    #[must_use]
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let ready = self.sync.lock_ready();
        let (state, wait) = self
            .sync
            .ready_changed
            .wait_timeout_while(ready, timeout, |state| {
                !(state.connected && state.bootstrapped)
            })
            .unwrap_or_else(PoisonError::into_inner);
        drop(state);
        !wait.timed_out()
    }

    /// Write a human-readable stats snapshot into `out`.
    pub fn write_stats(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "queue {}/{}: depth={} processed={} failed={} children={} pool={}/{} in_use={}",
            self.database_name,
            self.kind,
            self.depth(),
            self.sync.processed.load(Ordering::Relaxed),
            self.sync.failed.load(Ordering::Relaxed),
            self.lock_children().len(),
            self.pool.size(),
            self.pool.max_size(),
            self.pool.in_use_count(),
        );
    }

    /// Total queries this queue's worker has executed successfully / failed.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) {
        (
            self.sync.processed.load(Ordering::Relaxed),
            self.sync.failed.load(Ordering::Relaxed),
        )
    }

    /// Find a spawned worker queue of the given kind.
    #[must_use]
    pub fn child(&self, kind: QueueKind) -> Option<Arc<DatabaseQueue>> {
        self.lock_children()
            .iter()
            .find(|child| child.kind == kind)
            .cloned()
    }

    /// Spawn a worker queue of `kind` under this Lead.
    ///
    /// # Errors
    /// `ConfigError` when called on a non-Lead queue, for the `Lead` kind, or
    /// when a worker of that kind already exists; `CapacityExceeded` when the
    /// children array is full.
    pub fn spawn_child(self: &Arc<Self>, kind: QueueKind) -> Result<Arc<DatabaseQueue>, SqlDispatchError> {
        if !self.can_spawn_queues {
            return Err(SqlDispatchError::ConfigError(format!(
                "queue {}/{} cannot spawn workers",
                self.database_name, self.kind
            )));
        }
        if kind == QueueKind::Lead {
            return Err(SqlDispatchError::ConfigError(
                "a lead queue cannot spawn another lead".into(),
            ));
        }
        let mut children = self.lock_children();
        if children.iter().any(|child| child.kind == kind) {
            return Err(SqlDispatchError::ConfigError(format!(
                "a {kind} worker already exists for '{}'",
                self.database_name
            )));
        }
        if children.len() >= self.max_children {
            return Err(SqlDispatchError::CapacityExceeded(format!(
                "child queues for '{}'",
                self.database_name
            )));
        }
        let child = Self::create_worker(self, kind)?;
        children.push(Arc::clone(&child));
        info!(
            database = %self.database_name,
            kind = kind.as_str(),
            "spawned worker queue"
        );
        Ok(child)
    }

    /// Shut down and remove the worker queue of `kind`.
    ///
    /// # Errors
    /// `ConfigError` when called on a non-Lead queue or no such worker
    /// exists.
    pub fn shutdown_child(&self, kind: QueueKind) -> Result<(), SqlDispatchError> {
        if !self.can_spawn_queues {
            return Err(SqlDispatchError::ConfigError(format!(
                "queue {}/{} has no workers to shut down",
                self.database_name, self.kind
            )));
        }
        let child = {
            let mut children = self.lock_children();
            let idx = children
                .iter()
                .position(|child| child.kind == kind)
                .ok_or_else(|| {
                    SqlDispatchError::ConfigError(format!(
                        "no {kind} worker exists for '{}'",
                        self.database_name
                    ))
                })?;
            children.remove(idx)
        };
        child.shutdown();
        Ok(())
    }

    /// Request shutdown: stops children first, sets the shutdown flag, wakes
    /// the worker, and joins it. In-flight execution is never preempted; the
    /// worker exits at the next loop boundary and fails any still-queued
    /// work so waiting callers unblock. Idempotent.
    pub fn shutdown(&self) {
        let children: Vec<Arc<DatabaseQueue>> = self.lock_children().drain(..).collect();
        for child in children {
            child.shutdown();
        }

        self.sync.shutting_down.store(true, Ordering::Release);
        self.sync.work_available.notify_all();
        self.sync.ready_changed.notify_all();

        let handle = self.lock_worker().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for DatabaseQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DatabaseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseQueue")
            .field("database_name", &self.database_name)
            .field("kind", &self.kind.as_str())
            .field("depth", &self.depth())
            .finish()
    }
}

struct WorkerContext {
    database_name: String,
    kind: QueueKind,
    bootstrap_sql: Option<String>,
    is_lead: bool,
    idle_threshold: Duration,
    sync: Arc<QueueSync>,
    pool: Arc<ConnectionPool>,
    pending: Arc<PendingResultManager>,
    runtime: Handle,
}

fn run_queue_worker(ctx: &WorkerContext) {
    establish_initial_connection(ctx);

    while let Some(mut query) = next_query(ctx) {
        query.processed_at = Some(Utc::now());
        let started = Instant::now();
        let outcome = match ctx.runtime.block_on(execute_query(&ctx.pool, &query)) {
            Ok(outcome) => {
                ctx.sync.processed.fetch_add(1, Ordering::Relaxed);
                outcome
            }
            Err(e) => {
                ctx.sync.failed.fetch_add(1, Ordering::Relaxed);
                query.error_message = Some(e.to_string());
                warn!(
                    database = %ctx.database_name,
                    kind = ctx.kind.as_str(),
                    query_id = %query.query_id,
                    error = %e,
                    "query execution failed"
                );
                QueryOutcome::failed(&query.query_id, e.to_string(), started.elapsed())
            }
        };
        deliver(ctx, &query.query_id, outcome);
    }

    // Shutdown: drain still-queued work as failures so callers unblock.
    let drained: Vec<DatabaseQuery> = ctx.sync.lock_work().drain(..).collect();
    for query in drained {
        let message = format!(
            "queue for '{}' shut down before execution",
            ctx.database_name
        );
        deliver(
            ctx,
            &query.query_id,
            QueryOutcome::failed(&query.query_id, message, Duration::ZERO),
        );
    }
    info!(
        database = %ctx.database_name,
        kind = ctx.kind.as_str(),
        "queue worker stopped"
    );
}

/// Block until work arrives or shutdown is requested. Idle Lead workers run
/// pool idle-cleanup on wait timeouts.
fn next_query(ctx: &WorkerContext) -> Option<DatabaseQuery> {
    let mut work = ctx.sync.lock_work();
    loop {
        if ctx.sync.shutting_down.load(Ordering::Acquire) {
            return None;
        }
        if let Some(query) = work.pop_front() {
            return Some(query);
        }
        let (guard, wait) = ctx
            .sync
            .work_available
            .wait_timeout(work, IDLE_TICK)
            .unwrap_or_else(PoisonError::into_inner);
        work = guard;
        if wait.timed_out() && ctx.is_lead {
            drop(work);
            ctx.pool.cleanup_idle(ctx.idle_threshold);
            work = ctx.sync.lock_work();
        }
    }
}

fn deliver(ctx: &WorkerContext, query_id: &str, outcome: QueryOutcome) {
    match ctx.pending.complete(query_id, outcome) {
        Ok(()) => {}
        Err(SqlDispatchError::NotRegistered(_)) => {
            // Fire-and-forget submissions have no pending entry.
            debug!(query_id = %query_id, "completed query had no pending entry");
        }
        Err(e) => {
            debug!(query_id = %query_id, error = %e, "could not deliver query outcome");
        }
    }
}

/// Retry the first pool connection (plus bootstrap script, for Leads that
/// have one) until it succeeds or shutdown is requested, then open the ready
/// gate.
fn establish_initial_connection(ctx: &WorkerContext) {
    let mut backoff = Duration::from_millis(200);
    while !ctx.sync.shutting_down.load(Ordering::Acquire) {
        let attempt = ctx.runtime.block_on(async {
            let mut guard = ctx.pool.acquire().await?;
            // The connection gate opens even if the bootstrap script below
            // still has to retry.
            ctx.sync.mark_connected();
            if let Some(sql) = &ctx.bootstrap_sql {
                guard.executor()?.execute_batch(sql).await?;
            }
            Ok::<(), SqlDispatchError>(())
        });
        match attempt {
            Ok(()) => {
                ctx.sync.mark_ready();
                info!(
                    database = %ctx.database_name,
                    kind = ctx.kind.as_str(),
                    "queue ready"
                );
                return;
            }
            Err(e) => {
                warn!(
                    database = %ctx.database_name,
                    kind = ctx.kind.as_str(),
                    error = %e,
                    "initial connection failed; retrying"
                );
                thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_secs(1));
            }
        }
    }
}

/// Check out a connection, translate placeholders for its engine, and run
/// the query. Connection-level failures discard the pooled entry; query
/// failures return it.
async fn execute_query(
    pool: &Arc<ConnectionPool>,
    query: &DatabaseQuery,
) -> Result<QueryOutcome, SqlDispatchError> {
    let started = Instant::now();
    let mut guard = pool.acquire().await?;
    let conn = guard.executor()?;

    let style = placeholder_style(conn.engine());
    let sql = translate_placeholders(&query.sql, style, true);

    let result = run_operation(conn, query, &sql).await;
    match result {
        Ok((result_set, rows_affected)) => Ok(QueryOutcome::succeeded(
            &query.query_id,
            result_set,
            rows_affected,
            started.elapsed(),
        )),
        Err(e) => {
            if matches!(e, SqlDispatchError::ConnectionError(_)) {
                guard.discard();
            }
            Err(e)
        }
    }
}

async fn run_operation(
    conn: &mut crate::executor::EngineConnection,
    query: &DatabaseQuery,
    sql: &str,
) -> Result<(Option<crate::results::ResultSet>, usize), SqlDispatchError> {
    match (query.operation, &query.statement_name) {
        (QueryOperation::Batch, _) => {
            conn.execute_batch(sql).await?;
            Ok((None, 0))
        }
        (QueryOperation::Select, Some(name)) => {
            // A prepare failure falls back to a direct, uncached execution.
            let rs = if conn.prepare(name, sql).await.is_ok() {
                conn.execute_prepared_select(name, sql, &query.params).await?
            } else {
                conn.execute_select(sql, &query.params).await?
            };
            let affected = rs.rows_affected;
            Ok((Some(rs), affected))
        }
        (QueryOperation::Select, None) => {
            let rs = conn.execute_select(sql, &query.params).await?;
            let affected = rs.rows_affected;
            Ok((Some(rs), affected))
        }
        (QueryOperation::Dml, Some(name)) => {
            let affected = if conn.prepare(name, sql).await.is_ok() {
                conn.execute_prepared_dml(name, sql, &query.params).await?
            } else {
                conn.execute_dml(sql, &query.params).await?
            };
            Ok((None, affected))
        }
        (QueryOperation::Dml, None) => {
            let affected = conn.execute_dml(sql, &query.params).await?;
            Ok((None, affected))
        }
    }
}
