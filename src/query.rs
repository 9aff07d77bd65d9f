use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::results::ResultSet;
use crate::types::RowValues;

/// What a query does, which decides how the engine executes it and what the
/// outcome carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperation {
    /// Row-returning statement.
    Select,
    /// INSERT/UPDATE/DELETE etc.; outcome carries the affected-row count.
    Dml,
    /// Multi-statement script run in one transaction; no parameters.
    Batch,
}

impl QueryOperation {
    /// Infer the operation from the leading SQL verb.
    #[must_use]
    pub fn infer(sql: &str) -> Self {
        let head = sql.trim_start();
        let verb: String = head
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        match verb.as_str() {
            "select" | "with" | "explain" | "show" | "pragma" | "values" => {
                QueryOperation::Select
            }
            _ => QueryOperation::Dml,
        }
    }
}

/// One unit of work flowing through a database queue.
///
/// Created by the submission boundary, owned by the queue until its worker
/// dequeues and executes it; the outcome lands in the pending-result manager
/// under `query_id`.
#[derive(Debug, Clone)]
pub struct DatabaseQuery {
    /// Caller-visible unique id, also the pending-result key.
    pub query_id: String,
    /// SQL template in canonical placeholder style; translated per engine at
    /// execution time.
    pub sql: String,
    pub params: Vec<RowValues>,
    pub operation: QueryOperation,
    /// Prepared-statement cache key. `None` executes unprepared.
    pub statement_name: Option<String>,
    /// Pending-result timeout for this query.
    pub timeout: Duration,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    /// Populated by the executing worker when the query fails.
    pub error_message: Option<String>,
}

impl DatabaseQuery {
    /// Create a query with the operation inferred from the SQL verb.
    pub fn new(
        query_id: impl Into<String>,
        sql: impl Into<String>,
        params: Vec<RowValues>,
    ) -> Self {
        let sql = sql.into();
        let operation = QueryOperation::infer(&sql);
        Self {
            query_id: query_id.into(),
            sql,
            params,
            operation,
            statement_name: None,
            timeout: Duration::from_secs(30),
            submitted_at: Utc::now(),
            processed_at: None,
            retry_count: 0,
            error_message: None,
        }
    }

    #[must_use]
    pub fn with_operation(mut self, operation: QueryOperation) -> Self {
        self.operation = operation;
        self
    }

    #[must_use]
    pub fn with_statement_name(mut self, name: impl Into<String>) -> Self {
        self.statement_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The opaque outcome payload delivered through the pending-result manager:
/// success flag, rows (for SELECT), affected-row count, timing, and the
/// error message when the query failed. Serializable so the API layer can
/// hand it straight back to callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryOutcome {
    pub query_id: String,
    pub success: bool,
    pub result: Option<ResultSet>,
    pub rows_affected: usize,
    pub elapsed: Duration,
    pub error_message: Option<String>,
}

impl QueryOutcome {
    #[must_use]
    pub fn succeeded(
        query_id: impl Into<String>,
        result: Option<ResultSet>,
        rows_affected: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            success: true,
            result,
            rows_affected,
            elapsed,
            error_message: None,
        }
    }

    #[must_use]
    pub fn failed(query_id: impl Into<String>, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            query_id: query_id.into(),
            success: false,
            result: None,
            rows_affected: 0,
            elapsed,
            error_message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_inference_covers_common_verbs() {
        assert_eq!(QueryOperation::infer("SELECT 1"), QueryOperation::Select);
        assert_eq!(
            QueryOperation::infer("  with x as (select 1) select * from x"),
            QueryOperation::Select
        );
        assert_eq!(
            QueryOperation::infer("INSERT INTO t VALUES (1)"),
            QueryOperation::Dml
        );
        assert_eq!(QueryOperation::infer("update t set a = 1"), QueryOperation::Dml);
    }

    #[test]
    fn new_query_infers_and_stamps() {
        let q = DatabaseQuery::new("q1", "SELECT 1", vec![]);
        assert_eq!(q.operation, QueryOperation::Select);
        assert!(q.processed_at.is_none());
        assert_eq!(q.retry_count, 0);
        assert!(q.error_message.is_none());
    }
}
