//! Multi-engine database access core.
//!
//! Work enters through the [`dispatch::QueryDispatcher`], flows through a
//! per-database [`queue::DatabaseQueue`] (a Lead that may spawn specialized
//! workers), executes on pooled [`executor::EngineConnection`]s with bounded
//! LRU-cached prepared statements, and completes into the
//! [`pending::PendingResultManager`] where callers retrieve outcomes by query
//! id.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod pending;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod query_table;
pub mod queue;
pub mod queue_manager;
pub mod results;
pub mod statement_cache;
pub mod translation;
pub mod types;

#[cfg(feature = "db2")]
pub mod db2;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::SqlDispatchError;
