use async_trait::async_trait;

use crate::error::SqlDispatchError;
use crate::executor::EngineExecutor;
use crate::results::ResultSet;
use crate::types::{ConversionMode, ParamConverter, RowValues};

use super::config::PostgresConnection;
use super::params::Params;
use super::query::{build_result_set_from_rows, build_result_set_from_statement};

#[async_trait]
impl EngineExecutor for PostgresConnection {
    async fn begin(&mut self) -> Result<(), SqlDispatchError> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlDispatchError> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlDispatchError> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlDispatchError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Query)?;
        let rows = self
            .client
            .query(sql, converted.as_refs())
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("postgres select error: {e}")))?;
        build_result_set_from_rows(&rows)
    }

    async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Execute)?;
        let rows = self
            .client
            .execute(sql, converted.as_refs())
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("postgres execute error: {e}")))?;
        usize::try_from(rows).map_err(|e| {
            SqlDispatchError::ExecutionError(format!("postgres affected rows conversion error: {e}"))
        })
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<bool, SqlDispatchError> {
        if self.statements.get_matching(name, sql).is_some() {
            return Ok(true);
        }
        // Compile first; a prepare failure must leave the cache untouched.
        let stmt = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("postgres prepare error: {e}")))?;
        // A displaced statement deallocates server-side when the last handle
        // drops; nothing more to finalize here.
        let _evicted = self.statements.insert(name, sql, stmt);
        Ok(false)
    }

    async fn execute_prepared_select(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Query)?;
        let stmt = match self.statements.get_matching(name, sql) {
            Some(stmt) => stmt.clone(),
            // Cache miss: prepare fresh, don't cache
            None => self.client.prepare(sql).await.map_err(|e| {
                SqlDispatchError::ExecutionError(format!("postgres prepare error: {e}"))
            })?,
        };
        let rows = self
            .client
            .query(&stmt, converted.as_refs())
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("postgres select error: {e}")))?;
        build_result_set_from_statement(&stmt, &rows)
    }

    async fn execute_prepared_dml(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Execute)?;
        let stmt = match self.statements.get_matching(name, sql) {
            Some(stmt) => stmt.clone(),
            None => self.client.prepare(sql).await.map_err(|e| {
                SqlDispatchError::ExecutionError(format!("postgres prepare error: {e}"))
            })?,
        };
        let rows = self
            .client
            .execute(&stmt, converted.as_refs())
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("postgres execute error: {e}")))?;
        usize::try_from(rows).map_err(|e| {
            SqlDispatchError::ExecutionError(format!("postgres affected rows conversion error: {e}"))
        })
    }

    async fn cached_statement_count(&mut self) -> usize {
        self.statements.len()
    }
}
