//! The `_matstore_tables` table kept in every published schema.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::CacheKey;
use crate::catalog::{ColumnDef, DataType, Ident, QualifiedName};
use crate::table::RowSet;

pub const METADATA_TABLE: &str = "_matstore_tables";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    #[error("metadata table lacks column {0}")]
    MissingColumn(&'static str),

    #[error("metadata row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

/// One materialized table of a committed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_name: Ident,
    pub cache_key: Option<CacheKey>,
    pub version: Option<String>,
    pub run_id: String,
    pub materialized_at: DateTime<Utc>,
}

pub fn metadata_table(schema: &Ident) -> QualifiedName {
    QualifiedName::new(schema.clone(), Ident::from_static(METADATA_TABLE))
}

pub fn columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("table_name", DataType::Text).not_null(),
        ColumnDef::new("cache_key", DataType::Text),
        ColumnDef::new("version", DataType::Text),
        ColumnDef::new("run_id", DataType::Text).not_null(),
        ColumnDef::new("materialized_at", DataType::Timestamp).not_null(),
    ]
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

pub fn to_rowset(records: &[TableMetadata]) -> RowSet {
    let rows = records
        .iter()
        .map(|m| {
            vec![
                Value::String(m.table_name.to_string()),
                optional(m.cache_key.as_ref().map(CacheKey::as_str)),
                optional(m.version.as_deref()),
                Value::String(m.run_id.clone()),
                Value::String(m.materialized_at.to_rfc3339()),
            ]
        })
        .collect();
    RowSet::from_parts(columns(), rows)
}

pub fn from_rowset(rows: &RowSet) -> Result<Vec<TableMetadata>, MetadataError> {
    let index = |name: &'static str| rows.column_index(name).ok_or(MetadataError::MissingColumn(name));
    let (name_idx, key_idx, version_idx, run_idx, at_idx) = (
        index("table_name")?,
        index("cache_key")?,
        index("version")?,
        index("run_id")?,
        index("materialized_at")?,
    );

    rows.rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let invalid = |reason: String| MetadataError::InvalidRow { row: i, reason };
            let text = |idx: usize| row.get(idx).and_then(Value::as_str);

            let table_name = text(name_idx)
                .ok_or_else(|| invalid("table_name is not text".into()))
                .and_then(|s| Ident::new(s).map_err(|e| invalid(e.to_string())))?;
            let run_id = text(run_idx)
                .ok_or_else(|| invalid("run_id is not text".into()))?
                .to_string();
            let materialized_at = text(at_idx)
                .ok_or_else(|| invalid("materialized_at is not text".into()))
                .and_then(|s| DateTime::parse_from_rfc3339(s).map_err(|e| invalid(e.to_string())))?
                .with_timezone(&Utc);

            Ok(TableMetadata {
                table_name,
                cache_key: text(key_idx).map(CacheKey::from_stored),
                version: text(version_idx).map(str::to_string),
                run_id,
                materialized_at,
            })
        })
        .collect()
}

/// Records by table name.
pub fn index(records: Vec<TableMetadata>) -> HashMap<Ident, TableMetadata> {
    records.into_iter().map(|m| (m.table_name.clone(), m)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str, key: Option<&str>) -> TableMetadata {
        TableMetadata {
            table_name: Ident::new(name).unwrap(),
            cache_key: key.map(CacheKey::from_stored),
            version: key.map(|_| "1.0".to_string()),
            run_id: "01jabc".into(),
            materialized_at: Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_rowset_conversion() {
        let records = vec![record("customers", Some("ab12")), record("orders", None)];
        let rows = to_rowset(&records);
        rows.validate().unwrap();
        assert_eq!(rows.get(1, "cache_key"), Some(&Value::Null));

        assert_eq!(from_rowset(&rows).unwrap(), records);

        let by_name = index(records);
        assert!(by_name[&Ident::new("customers").unwrap()].cache_key.is_some());
    }

    #[test]
    fn test_from_rowset_errors() {
        let missing = RowSet::new(vec![ColumnDef::new("table_name", DataType::Text)]);
        assert_eq!(from_rowset(&missing), Err(MetadataError::MissingColumn("cache_key")));

        let mut bad = to_rowset(&[record("customers", None)]).into_rows();
        bad[0][4] = Value::String("yesterday".into());
        let bad = RowSet::from_parts(columns(), bad);
        assert!(matches!(from_rowset(&bad), Err(MetadataError::InvalidRow { row: 0, .. })));
    }

    #[test]
    fn test_metadata_table_is_reserved() {
        let table = metadata_table(&Ident::new("load").unwrap());
        assert!(table.name.is_reserved());
        assert_eq!(table.to_string(), "load._matstore_tables");
    }
}
