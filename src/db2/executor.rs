use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SqlDispatchError;
use crate::executor::EngineExecutor;
use crate::results::ResultSet;
use crate::types::{ConversionMode, ParamConverter, RowValues};

use super::config::Db2Connection;
use super::params::Params;
use super::query::build_result_set;

impl Db2Connection {
    fn run_select(
        &mut self,
        sql: &str,
        params: Params,
    ) -> Result<ResultSet, SqlDispatchError> {
        let cursor = self
            .conn
            .execute(sql, params.0.as_slice(), None)
            .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 select error: {e}")))?;
        match cursor {
            Some(cursor) => build_result_set(cursor),
            None => Ok(ResultSet::default()),
        }
    }

    fn run_dml(&mut self, sql: &str, params: Params) -> Result<usize, SqlDispatchError> {
        let mut prepared = self
            .conn
            .prepare(sql)
            .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 prepare error: {e}")))?;
        let _cursor = prepared
            .execute(params.0.as_slice())
            .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 execute error: {e}")))?;
        let affected = prepared
            .row_count()
            .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 row count error: {e}")))?;
        Ok(affected.unwrap_or(0))
    }
}

// ODBC calls are blocking; these async fns run them inline, which is fine on
// the queue worker threads this backend is driven from.
#[async_trait]
impl EngineExecutor for Db2Connection {
    async fn begin(&mut self) -> Result<(), SqlDispatchError> {
        // Db2 has no BEGIN statement; dropping out of autocommit opens the
        // unit of work.
        self.conn
            .set_autocommit(false)
            .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 begin error: {e}")))?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlDispatchError> {
        self.conn
            .commit()
            .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 commit error: {e}")))?;
        let _ = self.conn.set_autocommit(true);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlDispatchError> {
        self.conn
            .rollback()
            .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 rollback error: {e}")))?;
        let _ = self.conn.set_autocommit(true);
        self.in_transaction = false;
        Ok(())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlDispatchError> {
        // ODBC executes one statement per call; statement-split on the
        // terminator. Scripts with semicolons inside literals need to go
        // through execute_dml one statement at a time instead.
        for statement in sql.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            let _cursor = self.conn.execute(statement, (), None).map_err(|e| {
                SqlDispatchError::ExecutionError(format!("db2 batch error: {e}"))
            })?;
        }
        Ok(())
    }

    async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Query)?;
        self.run_select(sql, converted)
    }

    async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Execute)?;
        self.run_dml(sql, converted)
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<bool, SqlDispatchError> {
        if self.statements.get_matching(name, sql).is_some() {
            return Ok(true);
        }
        // Validate by compiling; the handle borrows the connection and is
        // dropped here, so the cached handle is the SQL text itself.
        let prepared = self
            .conn
            .prepare(sql)
            .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 prepare error: {e}")))?;
        drop(prepared);
        let _evicted = self.statements.insert(name, sql, Arc::new(sql.to_owned()));
        Ok(false)
    }

    async fn execute_prepared_select(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        // Touch the cache entry for recency; execution re-binds either way.
        let _ = self.statements.get_matching(name, sql);
        let converted = Params::convert_sql_params(params, ConversionMode::Query)?;
        self.run_select(sql, converted)
    }

    async fn execute_prepared_dml(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        let _ = self.statements.get_matching(name, sql);
        let converted = Params::convert_sql_params(params, ConversionMode::Execute)?;
        self.run_dml(sql, converted)
    }

    async fn cached_statement_count(&mut self) -> usize {
        self.statements.len()
    }
}
