//! Per-database SQL rendering and schema swap strategies.
//!
//! | dialect  | quoting | limit                     | swap strategy       |
//! |----------|---------|---------------------------|---------------------|
//! | postgres | `"x"`   | `LIMIT n`                 | [`SwapStrategy::AtomicRename`]      |
//! | duckdb   | `"x"`   | `LIMIT n`                 | [`SwapStrategy::TransactionalCopy`] |
//! | mssql    | `[x]`   | `TOP n`                   | [`SwapStrategy::TransferTables`]    |
//! | db2      | `"x"`   | `FETCH FIRST n ROWS ONLY` | [`SwapStrategy::CopyAndDrop`]       |

mod adapter;
mod db2;
mod duckdb;
mod error;
mod mssql;
mod postgres;
mod render;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use adapter::DialectAdapter;
pub use db2::Db2;
pub use duckdb::DuckDb;
pub use error::{DialectExecutionError, DialectResult};
pub use mssql::Mssql;
pub use postgres::Postgres;
pub use render::{render_expr, render_query, render_statement};

use crate::catalog::{DataType, Ident, QualifiedName};
use crate::sql::LiteralValue;

/// The supported target databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    Mssql,
    Db2,
    DuckDb,
}

impl DialectKind {
    pub const ALL: [DialectKind; 4] = [
        DialectKind::Postgres,
        DialectKind::Mssql,
        DialectKind::Db2,
        DialectKind::DuckDb,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mssql => "mssql",
            DialectKind::Db2 => "db2",
            DialectKind::DuckDb => "duckdb",
        }
    }

    pub fn dialect(&self) -> Box<dyn SqlDialect> {
        match self {
            DialectKind::Postgres => Box::new(Postgres),
            DialectKind::Mssql => Box::new(Mssql),
            DialectKind::Db2 => Box::new(Db2),
            DialectKind::DuckDb => Box::new(DuckDb),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dialect '{0}'")]
pub struct UnknownDialect(pub String);

impl FromStr for DialectKind {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mssql" | "tsql" | "sqlserver" => Ok(DialectKind::Mssql),
            "db2" | "ibm_db2" => Ok(DialectKind::Db2),
            "duckdb" => Ok(DialectKind::DuckDb),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}

/// How a working schema replaces the published one at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStrategy {
    /// Two schema renames in one transaction.
    AtomicRename,
    /// Tables moved between schemas inside one transaction.
    TransactionalCopy,
    /// `ALTER SCHEMA .. TRANSFER` per table, in two non-transactional
    /// phases. Between the phases readers can see a published schema that
    /// is empty or partially filled.
    TransferTables,
    /// Copy each table then drop the source, in two non-transactional
    /// phases, with the same window as [`SwapStrategy::TransferTables`].
    CopyAndDrop,
}

impl SwapStrategy {
    pub fn is_atomic(&self) -> bool {
        matches!(self, SwapStrategy::AtomicRename | SwapStrategy::TransactionalCopy)
    }
}

/// Where a row limit goes in a SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// trailing `LIMIT n`
    Limit,
    /// `SELECT TOP n`
    Top,
    /// trailing `FETCH FIRST n ROWS ONLY`
    FetchFirst,
}

/// SQL syntax of one database.
///
/// Defaults follow standard SQL / Postgres; each dialect overrides what it
/// does differently.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    fn kind(&self) -> DialectKind;

    fn type_name(&self, data_type: DataType) -> &'static str;

    fn swap_strategy(&self) -> SwapStrategy;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn qualified(&self, name: &QualifiedName) -> String {
        format!(
            "{}.{}",
            self.quote_ident(name.schema.as_str()),
            self.quote_ident(name.name.as_str())
        )
    }

    fn limit_style(&self) -> LimitStyle {
        LimitStyle::Limit
    }

    fn supports_drop_cascade(&self) -> bool {
        true
    }

    fn concat_operator(&self) -> &'static str {
        "||"
    }

    fn render_literal(&self, value: &LiteralValue) -> String {
        match value {
            LiteralValue::Null => "NULL".to_string(),
            LiteralValue::Boolean(true) => "TRUE".to_string(),
            LiteralValue::Boolean(false) => "FALSE".to_string(),
            LiteralValue::Integer(n) => n.to_string(),
            LiteralValue::Float(f) => format!("{:?}", f),
            LiteralValue::String(s) => quote_string(s),
        }
    }

    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn create_schema_sql(&self, schema: &Ident, if_not_exists: bool) -> String {
        if if_not_exists {
            format!("CREATE SCHEMA IF NOT EXISTS {}", self.quote_ident(schema.as_str()))
        } else {
            format!("CREATE SCHEMA {}", self.quote_ident(schema.as_str()))
        }
    }

    fn drop_schema_sql(&self, schema: &Ident, if_exists: bool, cascade: bool) -> String {
        format!(
            "DROP SCHEMA {}{}{}",
            if if_exists { "IF EXISTS " } else { "" },
            self.quote_ident(schema.as_str()),
            if cascade { " CASCADE" } else { "" }
        )
    }

    /// `None` when the database cannot rename a schema.
    fn rename_schema_sql(&self, from: &Ident, to: &Ident) -> Option<String> {
        Some(format!(
            "ALTER SCHEMA {} RENAME TO {}",
            self.quote_ident(from.as_str()),
            self.quote_ident(to.as_str())
        ))
    }

    fn drop_table_sql(&self, table: &QualifiedName, if_exists: bool) -> String {
        format!(
            "DROP TABLE {}{}",
            if if_exists { "IF EXISTS " } else { "" },
            self.qualified(table)
        )
    }

    fn create_table_as_sql(&self, table: &QualifiedName, select: &str) -> String {
        format!("CREATE TABLE {} AS {}", self.qualified(table), select)
    }

    fn transfer_table_sql(&self, source: &QualifiedName, target_schema: &Ident) -> String {
        format!(
            "ALTER TABLE {} SET SCHEMA {}",
            self.qualified(source),
            self.quote_ident(target_schema.as_str())
        )
    }

    /// Catalog query listing the tables of a schema.
    fn list_tables_sql(&self, schema: &Ident) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = {}",
            quote_string(schema.as_str())
        )
    }

    fn schema_exists_sql(&self, schema: &Ident) -> String {
        format!(
            "SELECT 1 FROM information_schema.schemata WHERE schema_name = {}",
            quote_string(schema.as_str())
        )
    }
    fn list_schemas_sql(&self) -> String {
        "SELECT schema_name FROM information_schema.schemata".to_string()
    }
}

/// Standard single-quoted string literal.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_kind_parsing() {
        assert_eq!("PostgreSQL".parse::<DialectKind>().unwrap(), DialectKind::Postgres);
        assert_eq!("tsql".parse::<DialectKind>().unwrap(), DialectKind::Mssql);
        assert_eq!("duckdb".parse::<DialectKind>().unwrap(), DialectKind::DuckDb);
        let err = "oracle".parse::<DialectKind>().unwrap_err();
        assert_eq!(err, UnknownDialect("oracle".into()));
        assert_eq!(err.to_string(), "unknown dialect 'oracle'");

        for kind in DialectKind::ALL {
            assert_eq!(kind.name().parse::<DialectKind>().unwrap(), kind);
            assert_eq!(kind.dialect().kind(), kind);
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&DialectKind::DuckDb).unwrap(), "\"duckdb\"");
        let kind: DialectKind = serde_json::from_str("\"db2\"").unwrap();
        assert_eq!(kind, DialectKind::Db2);
    }

    #[test]
    fn test_strategy_atomicity() {
        assert!(Postgres.swap_strategy().is_atomic());
        assert!(DuckDb.swap_strategy().is_atomic());
        assert!(!Mssql.swap_strategy().is_atomic());
        assert!(!Db2.swap_strategy().is_atomic());
    }

    #[test]
    fn test_quote_string() {
        assert_eq!(quote_string("o'brien"), "'o''brien'");
    }
}
