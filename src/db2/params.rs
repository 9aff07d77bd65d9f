use odbc_api::IntoParameter;
use odbc_api::parameter::InputParameter;

use crate::error::SqlDispatchError;
use crate::types::{ConversionMode, ParamConverter, RowValues};

/// Convert a single `RowValues` into a boxed ODBC input parameter.
#[must_use]
pub fn row_value_to_odbc_parameter(value: &RowValues) -> Box<dyn InputParameter> {
    match value {
        RowValues::Int(i) => Box::new((*i).into_parameter()),
        RowValues::Float(f) => Box::new((*f).into_parameter()),
        RowValues::Text(s) => Box::new(s.clone().into_parameter()),
        RowValues::Bool(b) => Box::new(i64::from(*b).into_parameter()),
        RowValues::Timestamp(dt) => {
            Box::new(dt.format("%F %T%.6f").to_string().into_parameter())
        }
        RowValues::Null => Box::new(None::<String>.into_parameter()),
        RowValues::JSON(jval) => Box::new(jval.to_string().into_parameter()),
        RowValues::Blob(bytes) => Box::new(bytes.clone().into_parameter()),
    }
}

/// Unified Db2 parameter container.
pub struct Params(pub Vec<Box<dyn InputParameter>>);

impl Params {
    /// Convert row values into boxed ODBC parameters.
    ///
    /// # Errors
    /// Currently infallible; keeps `Result` for converter-trait symmetry.
    pub fn convert(params: &[RowValues]) -> Result<Self, SqlDispatchError> {
        Ok(Params(
            params.iter().map(row_value_to_odbc_parameter).collect(),
        ))
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
