use async_trait::async_trait;

use crate::error::SqlDispatchError;
use crate::executor::EngineExecutor;
use crate::results::ResultSet;
use crate::types::{ConversionMode, ParamConverter, RowValues};

use super::params::Params;
use super::worker::SqliteConnection;

#[async_trait]
impl EngineExecutor for SqliteConnection {
    async fn begin(&mut self) -> Result<(), SqlDispatchError> {
        self.execute_batch("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), SqlDispatchError> {
        self.execute_batch("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), SqlDispatchError> {
        self.execute_batch("ROLLBACK").await
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlDispatchError> {
        SqliteConnection::execute_batch(self, sql.to_owned()).await
    }

    async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Query)?;
        SqliteConnection::execute_select(self, sql.to_owned(), converted.0).await
    }

    async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Execute)?;
        SqliteConnection::execute_dml(self, sql.to_owned(), converted.0).await
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<bool, SqlDispatchError> {
        SqliteConnection::prepare(self, name.to_owned(), sql.to_owned()).await
    }

    async fn execute_prepared_select(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Query)?;
        SqliteConnection::execute_prepared_select(self, name.to_owned(), sql.to_owned(), converted.0)
            .await
    }

    async fn execute_prepared_dml(
        &mut self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlDispatchError> {
        let converted = Params::convert_sql_params(params, ConversionMode::Execute)?;
        SqliteConnection::execute_prepared_dml(self, name.to_owned(), sql.to_owned(), converted.0)
            .await
    }

    async fn cached_statement_count(&mut self) -> usize {
        SqliteConnection::cached_statement_count(self).await
    }
}
