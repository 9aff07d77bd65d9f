use std::sync::Arc;

use rusqlite::types::ValueRef;

use crate::error::SqlDispatchError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Extract a `RowValues` from a rusqlite row at the given index.
///
/// # Errors
/// Returns `SqlDispatchError` if the column cannot be read.
pub fn extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, SqlDispatchError> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => RowValues::Null,
        ValueRef::Integer(i) => RowValues::Int(i),
        ValueRef::Real(f) => RowValues::Float(f),
        ValueRef::Text(bytes) => RowValues::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => RowValues::Blob(bytes.to_vec()),
    })
}

/// Run a prepared rusqlite statement and materialize every row.
///
/// # Errors
/// Returns errors from query execution or row extraction.
pub fn build_result_set(
    stmt: &mut rusqlite::Statement,
    params: &[rusqlite::types::Value],
) -> Result<ResultSet, SqlDispatchError> {
    let column_names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(16);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            values.push(extract_value(row, idx)?);
        }
        result_set.add_row_values(values);
    }

    Ok(result_set)
}
