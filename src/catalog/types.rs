//! Column types and definitions for materialized tables.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical column types. Each dialect maps these to its own type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Text/string data.
    Text,
    /// 64-bit integers.
    Integer,
    /// Double precision floating point.
    Float,
    Boolean,
    /// JSON objects or arrays.
    Json,
    /// Timestamps (stored as ISO 8601 strings).
    Timestamp,
    /// UUIDs (stored as strings).
    Uuid,
}

impl DataType {
    /// Check if a JSON value matches this data type. Null matches every type.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DataType::Text, Value::String(_)) => true,
            (DataType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (DataType::Float, Value::Number(_)) => true,
            (DataType::Boolean, Value::Bool(_)) => true,
            (DataType::Json, Value::Object(_) | Value::Array(_)) => true,
            (DataType::Timestamp, Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
                    || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
            }
            (DataType::Uuid, Value::String(s)) => {
                s.len() == 36 && s.chars().filter(|c| *c == '-').count() == 4
            }
            _ => false,
        }
    }

    /// Best-effort type for a sample value; `None` for null.
    pub fn infer(value: &Value) -> Option<DataType> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(DataType::Integer),
            Value::Number(_) => Some(DataType::Float),
            Value::String(_) => Some(DataType::Text),
            Value::Array(_) | Value::Object(_) => Some(DataType::Json),
        }
    }

    /// Generic SQL name, used in logs and as the local engine's type name.
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Text => "TEXT",
            DataType::Integer => "BIGINT",
            DataType::Float => "DOUBLE",
            DataType::Boolean => "BOOLEAN",
            DataType::Json => "JSON",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Uuid => "UUID",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// A column of a materialized table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Validate a value against this column definition.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            if !self.nullable {
                return Err(format!("column '{}' cannot be null", self.name));
            }
            return Ok(());
        }
        if !self.data_type.matches(value) {
            return Err(format!(
                "column '{}' expects type {}, got {}",
                self.name, self.data_type, value
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_type_matches() {
        assert!(DataType::Text.matches(&json!("hello")));
        assert!(!DataType::Text.matches(&json!(123)));

        assert!(DataType::Integer.matches(&json!(42)));
        assert!(DataType::Integer.matches(&json!(-17)));
        assert!(!DataType::Integer.matches(&json!(2.5)));

        assert!(DataType::Float.matches(&json!(2.5)));
        assert!(DataType::Float.matches(&json!(42)));

        assert!(DataType::Boolean.matches(&json!(true)));
        assert!(!DataType::Boolean.matches(&json!("true")));

        assert!(DataType::Timestamp.matches(&json!("2024-01-01T00:00:00Z")));
        assert!(!DataType::Timestamp.matches(&json!("yesterday")));

        assert!(DataType::Json.matches(&json!({"key": "value"})));
        assert!(DataType::Text.matches(&Value::Null));
    }

    #[test]
    fn test_infer() {
        assert_eq!(DataType::infer(&json!(1)), Some(DataType::Integer));
        assert_eq!(DataType::infer(&json!(1.5)), Some(DataType::Float));
        assert_eq!(DataType::infer(&json!("a")), Some(DataType::Text));
        assert_eq!(DataType::infer(&json!([1])), Some(DataType::Json));
        assert_eq!(DataType::infer(&Value::Null), None);
    }

    #[test]
    fn test_column_validation() {
        let col = ColumnDef::new("name", DataType::Text).not_null();
        assert!(col.validate(&json!("Alice")).is_ok());
        assert!(col.validate(&json!(123)).is_err());
        assert!(col.validate(&Value::Null).is_err());

        let nullable = ColumnDef::new("nickname", DataType::Text);
        assert!(nullable.validate(&Value::Null).is_ok());
        assert_eq!(col.to_string(), "name TEXT NOT NULL");
    }

    #[test]
    fn test_column_serde_defaults_nullable() {
        let col: ColumnDef = serde_json::from_str(r#"{"name":"id","data_type":"integer"}"#).unwrap();
        assert!(col.nullable);
        assert_eq!(col.data_type, DataType::Integer);
    }
}
