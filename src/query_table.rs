use std::time::Duration;

use crate::queue::QueueKind;
use crate::types::DatabaseType;

/// A pre-registered query template resolved through the external Query Table
/// Cache.
#[derive(Debug, Clone)]
pub struct QueryCacheEntry {
    /// SQL template in canonical placeholder style.
    pub sql_template: String,
    /// Pending-result timeout for queries built from this template.
    pub timeout: Duration,
    /// Queue the template should run on; overrides the caller's hint.
    pub queue_kind: QueueKind,
    /// Engine the template was written for.
    pub engine: DatabaseType,
}

/// Contract for the external registry of pre-approved query templates.
///
/// This core consumes entries; it never owns or populates the table. The
/// API layer supplies an implementation at dispatcher construction.
pub trait QueryTableCache: Send + Sync {
    /// Resolve a template by reference id. `None` means unknown reference.
    fn lookup(
        &self,
        query_ref: &str,
        queue_kind: QueueKind,
        database_label: &str,
    ) -> Option<QueryCacheEntry>;
}
