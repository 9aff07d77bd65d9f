//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::CoreConfig;
pub use crate::dispatch::{QueryDispatcher, QueryRequest, QuerySource};
pub use crate::error::SqlDispatchError;
pub use crate::executor::{EngineConnection, EngineExecutor};
pub use crate::pending::{PendingResultManager, ResultStatus};
pub use crate::pool::{ConnectionPool, ConnectionPoolManager, PooledConnection};
pub use crate::query::{DatabaseQuery, QueryOperation, QueryOutcome};
pub use crate::query_table::{QueryCacheEntry, QueryTableCache};
pub use crate::queue::{DatabaseQueue, LeadQueueOptions, QueueKind};
pub use crate::queue_manager::DatabaseQueueManager;
pub use crate::results::{DbRow, ResultSet};
pub use crate::statement_cache::{CachedStatement, StatementCache};
pub use crate::translation::{PlaceholderStyle, placeholder_style, translate_placeholders};
pub use crate::types::{ConversionMode, DatabaseType, ParamConverter, RowValues};
