use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::SqlDispatchError;

/// Values that can be stored in a database row or bound as query parameters.
///
/// One enum covers every backend so routing and queue code never branches on
/// driver types:
/// ```rust
/// use sql_dispatch::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Convert a single JSON value into the closest row value.
    ///
    /// Integers stay integers where the JSON number allows it; objects and
    /// arrays stay JSON.
    #[must_use]
    pub fn from_json(value: &JsonValue) -> RowValues {
        match value {
            JsonValue::Null => RowValues::Null,
            JsonValue::Bool(b) => RowValues::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RowValues::Int(i)
                } else {
                    RowValues::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => RowValues::Text(s.clone()),
            other => RowValues::JSON(other.clone()),
        }
    }

    /// Convert a JSON array payload into a parameter vector.
    ///
    /// This is the decode step for callers that hand parameters over as a
    /// serialized JSON document rather than as typed values.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ParameterError` if `value` is not a JSON
    /// array.
    pub fn vec_from_json(value: &JsonValue) -> Result<Vec<RowValues>, SqlDispatchError> {
        match value {
            JsonValue::Array(items) => Ok(items.iter().map(RowValues::from_json).collect()),
            other => Err(SqlDispatchError::ParameterError(format!(
                "expected a JSON array of parameters, got {other}"
            ))),
        }
    }
}

/// The database engines supported by this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DatabaseType {
    /// `PostgreSQL` database
    #[cfg(feature = "postgres")]
    Postgres,
    /// `MySQL` database
    #[cfg(feature = "mysql")]
    MySql,
    /// `SQLite` database
    #[cfg(feature = "sqlite")]
    Sqlite,
    /// IBM Db2 database (via ODBC)
    #[cfg(feature = "db2")]
    Db2,
}

impl DatabaseType {
    /// Short lowercase label used in stats output and log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => "postgres",
            #[cfg(feature = "mysql")]
            DatabaseType::MySql => "mysql",
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => "sqlite",
            #[cfg(feature = "db2")]
            DatabaseType::Db2 => "db2",
        }
    }
}

/// The conversion "mode".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConversionMode {
    /// When the converted parameters will be used in a query (SELECT)
    Query,
    /// When the converted parameters will be used for statement execution (INSERT/UPDATE/etc.)
    Execute,
}

/// Convert a slice of `RowValues` into database-specific parameters.
/// Each backend's `params` module implements this so generic code can convert
/// without knowing the driver type.
pub trait ParamConverter<'a> {
    type Converted;

    /// Convert a slice of `RowValues` into the backend's parameter type.
    ///
    /// # Errors
    ///
    /// Returns `SqlDispatchError` if the conversion fails for any parameter.
    fn convert_sql_params(
        params: &'a [RowValues],
        mode: ConversionMode,
    ) -> Result<Self::Converted, SqlDispatchError>;

    /// Check if this converter supports the given mode
    #[must_use]
    fn supports_mode(_mode: ConversionMode) -> bool {
        true // By default, support both modes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_array_converts_to_params() {
        let payload = json!([1, "two", 3.5, true, null, {"k": "v"}]);
        let params = RowValues::vec_from_json(&payload).unwrap();
        assert_eq!(params[0], RowValues::Int(1));
        assert_eq!(params[1], RowValues::Text("two".into()));
        assert_eq!(params[2], RowValues::Float(3.5));
        assert_eq!(params[3], RowValues::Bool(true));
        assert_eq!(params[4], RowValues::Null);
        assert_eq!(params[5], RowValues::JSON(json!({"k": "v"})));
    }

    #[test]
    fn json_non_array_is_rejected() {
        assert!(RowValues::vec_from_json(&json!({"a": 1})).is_err());
    }

    #[test]
    fn bool_coerces_from_int() {
        assert_eq!(RowValues::Int(1).as_bool(), Some(&true));
        assert_eq!(RowValues::Int(0).as_bool(), Some(&false));
        assert_eq!(RowValues::Int(7).as_bool(), None);
    }
}
