//! DuckDB.

use super::{DialectKind, SqlDialect, SwapStrategy};
use crate::catalog::{DataType, Ident, QualifiedName};

/// DuckDB has transactional DDL but can neither rename a schema nor move a
/// table between schemas, so the swap copies tables inside one transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn kind(&self) -> DialectKind {
        DialectKind::DuckDb
    }

    fn type_name(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Text => "VARCHAR",
            DataType::Integer => "BIGINT",
            DataType::Float => "DOUBLE",
            DataType::Boolean => "BOOLEAN",
            DataType::Json => "JSON",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Uuid => "UUID",
        }
    }

    fn swap_strategy(&self) -> SwapStrategy {
        SwapStrategy::TransactionalCopy
    }

    fn begin_sql(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn rename_schema_sql(&self, _from: &Ident, _to: &Ident) -> Option<String> {
        None
    }

    fn transfer_table_sql(&self, source: &QualifiedName, target_schema: &Ident) -> String {
        let target = source.in_schema(target_schema);
        format!(
            "CREATE TABLE {} AS SELECT * FROM {};\n{}",
            self.qualified(&target),
            self.qualified(source),
            self.drop_table_sql(source, false)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::DuckDbDialect;
    use sqlparser::parser::Parser;

    #[test]
    fn test_transfer_is_copy_then_drop() {
        let source = QualifiedName::parse("load.orders").unwrap();
        let sql = DuckDb.transfer_table_sql(&source, &Ident::new("load__prev").unwrap());
        assert_eq!(
            sql,
            "CREATE TABLE \"load__prev\".\"orders\" AS SELECT * FROM \"load\".\"orders\";\nDROP TABLE \"load\".\"orders\""
        );
        assert_eq!(Parser::parse_sql(&DuckDbDialect {}, &sql).unwrap().len(), 2);
    }
}
