use chrono::{Datelike, Timelike};
use mysql_async::Value;

use crate::error::SqlDispatchError;
use crate::types::{ConversionMode, ParamConverter, RowValues};

/// Convert a single `RowValues` into a `mysql_async` value.
#[must_use]
pub fn row_value_to_mysql_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Int(*i),
        RowValues::Float(f) => Value::Double(*f),
        RowValues::Text(s) => Value::Bytes(s.clone().into_bytes()),
        RowValues::Bool(b) => Value::Int(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Date(
            u16::try_from(dt.year()).unwrap_or(0),
            u8::try_from(dt.month()).unwrap_or(1),
            u8::try_from(dt.day()).unwrap_or(1),
            u8::try_from(dt.hour()).unwrap_or(0),
            u8::try_from(dt.minute()).unwrap_or(0),
            u8::try_from(dt.second()).unwrap_or(0),
            dt.and_utc().timestamp_subsec_micros(),
        ),
        RowValues::Null => Value::NULL,
        RowValues::JSON(jval) => Value::Bytes(jval.to_string().into_bytes()),
        RowValues::Blob(bytes) => Value::Bytes(bytes.clone()),
    }
}

/// Unified `MySQL` parameter container.
pub struct Params(pub Vec<Value>);

impl Params {
    /// Convert row values into `MySQL` values.
    ///
    /// # Errors
    /// Currently infallible; keeps `Result` for converter-trait symmetry.
    pub fn convert(params: &[RowValues]) -> Result<Self, SqlDispatchError> {
        Ok(Params(
            params.iter().map(row_value_to_mysql_value).collect(),
        ))
    }

    /// Consume into the driver's positional parameter pack.
    #[must_use]
    pub fn into_params(self) -> mysql_async::Params {
        if self.0.is_empty() {
            mysql_async::Params::Empty
        } else {
            mysql_async::Params::Positional(self.0)
        }
    }
}

impl ParamConverter<'_> for Params {
    type Converted = Params;

    fn convert_sql_params(
        params: &[RowValues],
        _mode: ConversionMode,
    ) -> Result<Self::Converted, SqlDispatchError> {
        Self::convert(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_bind_as_empty_pack() {
        let converted = Params::convert(&[]).unwrap();
        assert!(matches!(converted.into_params(), mysql_async::Params::Empty));
    }

    #[test]
    fn values_map_to_driver_variants() {
        assert_eq!(
            row_value_to_mysql_value(&RowValues::Int(7)),
            Value::Int(7)
        );
        assert_eq!(
            row_value_to_mysql_value(&RowValues::Bool(true)),
            Value::Int(1)
        );
        assert_eq!(row_value_to_mysql_value(&RowValues::Null), Value::NULL);
        assert_eq!(
            row_value_to_mysql_value(&RowValues::Text("abc".into())),
            Value::Bytes(b"abc".to_vec())
        );
    }
}
