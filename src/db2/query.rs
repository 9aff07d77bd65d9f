use std::sync::Arc;

use odbc_api::buffers::TextRowSet;
use odbc_api::{Cursor, ResultSetMetadata};

use crate::error::SqlDispatchError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Batch size for fetching rows through the text buffer.
const ROW_BATCH_SIZE: usize = 64;
/// Upper bound per text cell; wider columns are truncated by the driver.
const MAX_CELL_BYTES: usize = 4096;

/// Materialize an ODBC cursor into a result set.
///
/// Everything arrives through ODBC's text representation, so values come
/// back as [`RowValues::Text`] (or [`RowValues::Null`]); callers lean on the
/// text coercions of `RowValues` for numbers and timestamps. This is the
/// same pragmatic extraction the core uses for engines with loosely typed
/// row APIs.
///
/// # Errors
/// Returns `SqlDispatchError::ExecutionError` if fetching fails.
pub fn build_result_set(mut cursor: impl Cursor) -> Result<ResultSet, SqlDispatchError> {
    let column_names: Vec<String> = cursor
        .column_names()
        .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 column name error: {e}")))?
        .collect::<Result<_, _>>()
        .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 column name error: {e}")))?;
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(ROW_BATCH_SIZE);
    result_set.set_column_names(Arc::new(column_names));

    let mut buffers = TextRowSet::for_cursor(ROW_BATCH_SIZE, &mut cursor, Some(MAX_CELL_BYTES))
        .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 buffer error: {e}")))?;
    let mut row_set_cursor = cursor
        .bind_buffer(&mut buffers)
        .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 bind error: {e}")))?;

    while let Some(batch) = row_set_cursor
        .fetch()
        .map_err(|e| SqlDispatchError::ExecutionError(format!("db2 fetch error: {e}")))?
    {
        for row_idx in 0..batch.num_rows() {
            let mut values = Vec::with_capacity(col_count);
            for col_idx in 0..col_count {
                let value = batch
                    .at(col_idx, row_idx)
                    .map(|bytes| RowValues::Text(String::from_utf8_lossy(bytes).into_owned()))
                    .unwrap_or(RowValues::Null);
                values.push(value);
            }
            result_set.add_row_values(values);
        }
    }

    Ok(result_set)
}
