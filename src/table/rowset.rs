//! Eager, column-typed rows: the built-in tabular payload.

use std::any::Any;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::payload::{Payload, PayloadType};
use crate::catalog::{ColumnDef, DataType};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowSetError {
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("row {row} has {found} values, expected {expected}")]
    Arity { row: usize, expected: usize, found: usize },

    #[error("row {row}: {reason}")]
    InvalidValue { row: usize, reason: String },
}

/// Rows held in memory, each a vector in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a row set, checking every row against the columns.
    pub fn with_rows(columns: Vec<ColumnDef>, rows: Vec<Vec<Value>>) -> Result<Self, RowSetError> {
        let set = Self { columns, rows };
        set.validate()?;
        Ok(set)
    }

    /// Rows already known to fit the columns, e.g. read back from storage.
    pub(crate) fn from_parts(columns: Vec<ColumnDef>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Build from JSON objects. Column order follows first appearance and
    /// column types are inferred from the first non-null value; columns that
    /// are null everywhere become text.
    pub fn from_records(records: &[Map<String, Value>]) -> Result<Self, RowSetError> {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .iter()
            .map(|name| {
                let data_type = records
                    .iter()
                    .filter_map(|r| r.get(name))
                    .find_map(DataType::infer)
                    .unwrap_or(DataType::Text);
                ColumnDef::new(name.clone(), data_type)
            })
            .collect();

        let rows = records
            .iter()
            .map(|record| {
                names
                    .iter()
                    .map(|name| record.get(name).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self::with_rows(columns, rows)
    }

    pub fn push(&mut self, row: Vec<Value>) -> Result<(), RowSetError> {
        self.check_row(self.rows.len(), &row)?;
        self.rows.push(row);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RowSetError> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(RowSetError::DuplicateColumn(column.name.clone()));
            }
        }
        self.rows
            .iter()
            .enumerate()
            .try_for_each(|(i, row)| self.check_row(i, row))
    }

    fn check_row(&self, index: usize, row: &[Value]) -> Result<(), RowSetError> {
        if row.len() != self.columns.len() {
            return Err(RowSetError::Arity {
                row: index,
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        for (column, value) in self.columns.iter().zip(row) {
            column
                .validate(value)
                .map_err(|reason| RowSetError::InvalidValue { row: index, reason })?;
        }
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    /// Value at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of one column.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Payload for RowSet {
    fn payload_type(&self) -> PayloadType {
        PayloadType::of::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn content_fingerprint(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", DataType::Integer).not_null(),
            ColumnDef::new("name", DataType::Text),
        ]
    }

    #[test]
    fn test_with_rows_validates() {
        let ok = RowSet::with_rows(columns(), vec![vec![json!(1), json!("a")]]).unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok.get(0, "name"), Some(&json!("a")));

        let arity = RowSet::with_rows(columns(), vec![vec![json!(1)]]);
        assert_eq!(
            arity,
            Err(RowSetError::Arity {
                row: 0,
                expected: 2,
                found: 1
            })
        );

        let mut set = RowSet::new(columns());
        assert!(matches!(
            set.push(vec![json!("x"), json!("a")]),
            Err(RowSetError::InvalidValue { row: 0, .. })
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let cols = vec![
            ColumnDef::new("id", DataType::Integer),
            ColumnDef::new("id", DataType::Text),
        ];
        assert_eq!(
            RowSet::with_rows(cols, Vec::new()),
            Err(RowSetError::DuplicateColumn("id".into()))
        );
    }

    #[test]
    fn test_from_records_infers_columns() {
        let records: Vec<Map<String, Value>> = vec![
            json!({"id": 1, "note": null}).as_object().unwrap().clone(),
            json!({"id": 2, "note": null, "score": 1.5}).as_object().unwrap().clone(),
        ];
        let set = RowSet::from_records(&records).unwrap();

        assert_eq!(set.column_names(), vec!["id", "note", "score"]);
        assert_eq!(set.columns()[0].data_type, DataType::Integer);
        assert_eq!(set.columns()[1].data_type, DataType::Text);
        assert_eq!(set.columns()[2].data_type, DataType::Float);
        assert_eq!(set.get(0, "score"), Some(&Value::Null));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = RowSet::with_rows(columns(), vec![vec![json!(1), json!("a")]]).unwrap();
        let b = RowSet::with_rows(columns(), vec![vec![json!(1), json!("b")]]).unwrap();
        assert_eq!(a.content_fingerprint(), a.clone().content_fingerprint());
        assert_ne!(a.content_fingerprint(), b.content_fingerprint());
    }
}
