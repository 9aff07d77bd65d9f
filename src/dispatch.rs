//! The submission boundary the API layer calls: resolve the target queue,
//! build the query, register its pending result, and submit.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::SqlDispatchError;
use crate::pending::PendingResultManager;
use crate::query::{DatabaseQuery, QueryOutcome};
use crate::query_table::QueryTableCache;
use crate::queue::{DatabaseQueue, QueueKind};
use crate::queue_manager::DatabaseQueueManager;
use crate::types::RowValues;

/// Where the SQL for a request comes from.
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// Raw SQL supplied by the caller.
    Sql(String),
    /// Reference id resolved through the Query Table Cache; the id doubles
    /// as the prepared-statement cache key.
    Ref(String),
}

/// One submission request.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub database: String,
    /// Queue-type hint. `None` routes to the Lead itself.
    pub queue_hint: Option<String>,
    pub source: QuerySource,
    pub params: Vec<RowValues>,
    /// Pending-result timeout; defaults to the configured value (or the
    /// query-table entry's, for referenced queries).
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn sql(database: impl Into<String>, sql: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            database: database.into(),
            queue_hint: None,
            source: QuerySource::Sql(sql.into()),
            params,
            timeout: None,
        }
    }

    pub fn by_ref(
        database: impl Into<String>,
        query_ref: impl Into<String>,
        params: Vec<RowValues>,
    ) -> Self {
        Self {
            database: database.into(),
            queue_hint: None,
            source: QuerySource::Ref(query_ref.into()),
            params,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_queue_hint(mut self, hint: impl Into<String>) -> Self {
        self.queue_hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The boundary surface consumed by the external API layer.
pub struct QueryDispatcher {
    queues: Arc<DatabaseQueueManager>,
    pending: Arc<PendingResultManager>,
    query_table: Option<Arc<dyn QueryTableCache>>,
    default_timeout: Duration,
}

impl QueryDispatcher {
    #[must_use]
    pub fn new(
        queues: Arc<DatabaseQueueManager>,
        pending: Arc<PendingResultManager>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            queues,
            pending,
            query_table: None,
            default_timeout: config.default_query_timeout,
        }
    }

    #[must_use]
    pub fn with_query_table(mut self, query_table: Arc<dyn QueryTableCache>) -> Self {
        self.query_table = Some(query_table);
        self
    }

    #[must_use]
    pub fn pending(&self) -> &Arc<PendingResultManager> {
        &self.pending
    }

    /// Resolve a Lead queue: exact database-name match first, then fall back
    /// to the connection-name alias. Both scans run in registration order
    /// and the first match wins.
    #[must_use]
    pub fn resolve_queue(&self, database: &str) -> Option<Arc<DatabaseQueue>> {
        if let Some(queue) = self.queues.get_database(database) {
            return Some(queue);
        }
        self.queues
            .snapshot()
            .into_iter()
            .find(|queue| queue.connection_name() == Some(database))
    }

    /// Submit a query and return its id; the result arrives through the
    /// pending-result manager.
    ///
    /// The pending entry is registered before the queue sees the query so a
    /// fast worker can never complete into an unregistered id; a failed
    /// submission unregisters it again, leaving nothing behind.
    ///
    /// # Errors
    /// `UnknownDatabase` when no queue matches, `QueryRefNotFound` for an
    /// unknown template reference, plus registration and submission errors.
    pub fn submit(&self, request: QueryRequest) -> Result<String, SqlDispatchError> {
        let lead = self
            .resolve_queue(&request.database)
            .ok_or_else(|| SqlDispatchError::UnknownDatabase(request.database.clone()))?;

        let (sql, statement_name, table_timeout, table_kind) = match &request.source {
            QuerySource::Sql(sql) => (sql.clone(), None, None, None),
            QuerySource::Ref(query_ref) => {
                let hinted = QueueKind::select(request.queue_hint.as_deref());
                let entry = self
                    .query_table
                    .as_ref()
                    .and_then(|table| table.lookup(query_ref, hinted, &request.database))
                    .ok_or_else(|| SqlDispatchError::QueryRefNotFound(query_ref.clone()))?;
                (
                    entry.sql_template,
                    Some(query_ref.clone()),
                    Some(entry.timeout),
                    Some(entry.queue_kind),
                )
            }
        };

        // A registered template's queue kind overrides the caller's hint.
        let target = match (table_kind, &request.queue_hint) {
            (Some(kind), _) => self.route_to_kind(&lead, kind)?,
            (None, Some(hint)) => {
                self.route_to_kind(&lead, QueueKind::select(Some(hint.as_str())))?
            }
            (None, None) => lead,
        };

        let timeout = request
            .timeout
            .or(table_timeout)
            .unwrap_or(self.default_timeout);
        let query_id = generate_query_id();

        let mut query = DatabaseQuery::new(&query_id, sql, request.params).with_timeout(timeout);
        if let Some(name) = statement_name {
            query = query.with_statement_name(name);
        }

        self.pending.register(&query_id, timeout)?;
        if let Err(e) = target.submit(query) {
            // Unwind: nothing of this attempt survives a failed submission.
            self.pending.unregister(&query_id);
            return Err(e);
        }

        debug!(
            query_id = %query_id,
            database = %request.database,
            queue = target.kind().as_str(),
            "query submitted"
        );
        Ok(query_id)
    }

    /// Submit and block until the result completes or its timeout expires.
    ///
    /// # Errors
    /// Submission errors, or `ResultExpired` on timeout.
    pub async fn submit_and_wait(
        &self,
        request: QueryRequest,
    ) -> Result<QueryOutcome, SqlDispatchError> {
        let query_id = self.submit(request)?;
        self.pending.wait(&query_id).await
    }

    fn route_to_kind(
        &self,
        lead: &Arc<DatabaseQueue>,
        kind: QueueKind,
    ) -> Result<Arc<DatabaseQueue>, SqlDispatchError> {
        if kind == QueueKind::Lead {
            return Ok(Arc::clone(lead));
        }
        if let Some(child) = lead.child(kind) {
            return Ok(child);
        }
        match lead.spawn_child(kind) {
            Ok(child) => Ok(child),
            // Lost a spawn race to a concurrent submitter; use theirs.
            Err(e) => lead.child(kind).ok_or(e),
        }
    }
}

/// Generate a unique query id.
fn generate_query_id() -> String {
    format!("qry_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_id_format() {
        let id = generate_query_id();
        assert!(id.starts_with("qry_"));
        assert_eq!(id.len(), 4 + 32); // "qry_" + 32 hex chars
    }
}
