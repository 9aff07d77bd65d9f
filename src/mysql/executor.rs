use async_trait::async_trait;
use mysql_async::Row;
use mysql_async::prelude::Queryable;

use crate::error::SqlDispatchError;
use crate::executor::EngineExecutor;
use crate::results::ResultSet;
use crate::types::{ConversionMode, ParamConverter, RowValues};

use super::config::MySqlConnection;
use super::params::Params;
use super::query::build_result_set;

#[async_trait]
impl EngineExecutor for MySqlConnection {
    async fn begin(&mut self) -> Result<(), SqlDispatchError> {
        self.conn.query_drop("START TRANSACTION").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlDispatchError> {
        self.conn.query_drop("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlDispatchError> {
        self.conn.query_drop("ROLLBACK").await?;
        Ok(())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlDispatchError> {
        // Scripts run inside one transaction so a mid-script failure leaves
        // nothing half-applied. Multi-statement text requires the connection
        // URL to enable it; single statements always work.
        self.conn.query_drop("START TRANSACTION").await?;
        match self.conn.query_drop(sql).await {
            Ok(()) => {
                self.conn.query_drop("COMMIT").await?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.query_drop("ROLLBACK").await;
                Err(e.into())
            }
        }
    }

    async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Query)?;
        let rows: Vec<Row> = self
            .conn
            .exec(sql, converted.into_params())
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("mysql select error: {e}")))?;
        build_result_set(&rows)
    }

    async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Execute)?;
        self.conn
            .exec_drop(sql, converted.into_params())
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("mysql execute error: {e}")))?;
        usize::try_from(self.conn.affected_rows()).map_err(|e| {
            SqlDispatchError::ExecutionError(format!("mysql affected rows conversion error: {e}"))
        })
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<bool, SqlDispatchError> {
        if self.statements.get_matching(name, sql).is_some() {
            return Ok(true);
        }
        let stmt = self
            .conn
            .prep(sql)
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("mysql prepare error: {e}")))?;
        if let Some(evicted) = self.statements.insert(name, sql, stmt) {
            // Release the server-side handle for the displaced statement.
            if let Err(e) = self.conn.close(evicted).await {
                tracing::debug!(error = %e, "failed to close evicted mysql statement");
            }
        }
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
            None => self.conn.prep(sql).await.map_err(|e| {
                SqlDispatchError::ExecutionError(format!("mysql prepare error: {e}"))
            })?,
        };
        let rows: Vec<Row> = self
            .conn
            .exec(&stmt, converted.into_params())
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("mysql select error: {e}")))?;
        build_result_set(&rows)
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
            None => self.conn.prep(sql).await.map_err(|e| {
                SqlDispatchError::ExecutionError(format!("mysql prepare error: {e}"))
            })?,
        };
        self.conn
            .exec_drop(&stmt, converted.into_params())
            .await
            .map_err(|e| SqlDispatchError::ExecutionError(format!("mysql execute error: {e}")))?;
        usize::try_from(self.conn.affected_rows()).map_err(|e| {
            SqlDispatchError::ExecutionError(format!("mysql affected rows conversion error: {e}"))
        })
    }

    async fn cached_statement_count(&mut self) -> usize {
        self.statements.len()
    }
}
