use chrono::NaiveDate;
use mysql_async::{Row, Value};

use crate::error::SqlDispatchError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Extract a `RowValues` from a `mysql_async` row at the given index.
///
/// Byte payloads that decode as UTF-8 come back as text; anything else stays
/// a blob. The same pragmatic cascade the other backends use for types the
/// driver reports loosely.
#[must_use]
pub fn extract_value(row: &Row, idx: usize) -> RowValues {
    let Some(value) = row.as_ref(idx) else {
        return RowValues::Null;
    };

    match value {
        Value::NULL => RowValues::Null,
        Value::Int(i) => RowValues::Int(*i),
        Value::UInt(u) => i64::try_from(*u)
            .map_or_else(|_| RowValues::Float(*u as f64), RowValues::Int),
        Value::Float(f) => RowValues::Float(f64::from(*f)),
        Value::Double(d) => RowValues::Float(*d),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                })
                .map_or(RowValues::Null, RowValues::Timestamp)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = u32::from(*days) * 24 + u32::from(*hours);
            RowValues::Text(format!(
                "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => RowValues::Text(s.to_string()),
            Err(_) => RowValues::Blob(bytes.clone()),
        },
    }
}

/// Build a result set from fully fetched `MySQL` rows.
///
/// # Errors
/// Currently infallible; keeps `Result` so the executor's call sites stay
/// uniform across backends.
pub fn build_result_set(rows: &[Row]) -> Result<ResultSet, SqlDispatchError> {
    let mut result_set = ResultSet::with_capacity(rows.len());
    if let Some(row) = rows.first() {
        let cols: Vec<String> = row
            .columns_ref()
            .iter()
            .map(|c| c.name_str().to_string())
            .collect();
        result_set.set_column_names(std::sync::Arc::new(cols));
    }

    for row in rows {
        let col_count = row.columns_ref().len();
        let mut row_values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            row_values.push(extract_value(row, idx));
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}
