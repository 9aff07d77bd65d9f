use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::row::DbRow;
use crate::types::RowValues;

/// A result set from a database query.
///
/// Holds the rows returned by a SELECT, or just `rows_affected` for DML.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    /// The rows returned by the query
    pub rows: Vec<DbRow>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: usize,
    #[serde(skip)]
    column_names: Option<Arc<Vec<String>>>,
    #[serde(skip)]
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known row capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            rows: Vec::with_capacity(capacity),
            rows_affected: 0,
            column_names: None,
            column_index: None,
        }
    }

    /// Set the column names for this result set (shared by all rows).
    ///
    /// The name→index map is built once here and reused by every row.
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        let index = column_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect::<HashMap<_, _>>();
        self.column_index = Some(Arc::new(index));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set.
    #[must_use]
    pub fn column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row of values to the result set.
    ///
    /// No-op if column names have not been set yet; engine adapters always
    /// set them before materializing rows.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        let (Some(names), Some(index)) = (&self.column_names, &self.column_index) else {
            return;
        };
        self.rows
            .push(DbRow::new(Arc::clone(names), Arc::clone(index), values));
        self.rows_affected += 1;
    }

    /// Number of rows in the result set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_column_names_and_resolve_by_name() {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(Arc::new(vec!["id".to_string(), "name".to_string()]));
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("a".into())]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("b".into())]);

        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        assert_eq!(*rs.rows[0].get("id").unwrap().as_int().unwrap(), 1);
        assert_eq!(rs.rows[1].get("name").unwrap().as_text().unwrap(), "b");
        assert!(rs.rows[0].get("missing").is_none());
    }

    #[test]
    fn add_before_column_names_is_ignored() {
        let mut rs = ResultSet::default();
        rs.add_row_values(vec![RowValues::Int(1)]);
        assert!(rs.is_empty());
        assert_eq!(rs.rows_affected, 0);
    }
}
