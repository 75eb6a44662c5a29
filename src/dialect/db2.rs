//! IBM DB2.

use super::{quote_string, DialectKind, LimitStyle, SqlDialect, SwapStrategy};
use crate::catalog::{DataType, Ident, QualifiedName};

/// No schema rename and no table move: the swap copies each table with
/// `CREATE TABLE .. AS (..) WITH DATA` and drops the source, in two phases.
#[derive(Debug, Clone, Copy, Default)]
pub struct Db2;

impl SqlDialect for Db2 {
    fn kind(&self) -> DialectKind {
        DialectKind::Db2
    }

    fn type_name(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Text => "VARCHAR(32000)",
            DataType::Integer => "BIGINT",
            DataType::Float => "DOUBLE",
            DataType::Boolean => "BOOLEAN",
            DataType::Json => "CLOB",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Uuid => "CHAR(36)",
        }
    }

    fn swap_strategy(&self) -> SwapStrategy {
        SwapStrategy::CopyAndDrop
    }

    fn limit_style(&self) -> LimitStyle {
        LimitStyle::FetchFirst
    }

    fn supports_drop_cascade(&self) -> bool {
        false
    }

    fn create_schema_sql(&self, schema: &Ident, if_not_exists: bool) -> String {
        let create = format!("CREATE SCHEMA {}", self.quote_ident(schema.as_str()));
        if !if_not_exists {
            return create;
        }
        format!(
            "BEGIN IF NOT EXISTS (SELECT 1 FROM SYSCAT.SCHEMATA WHERE SCHEMANAME = {}) THEN EXECUTE IMMEDIATE {}; END IF; END",
            quote_string(schema.as_str()),
            quote_string(&create)
        )
    }

    /// DB2 has no `IF EXISTS` here; callers check existence first.
    fn drop_schema_sql(&self, schema: &Ident, _if_exists: bool, _cascade: bool) -> String {
        format!("DROP SCHEMA {} RESTRICT", self.quote_ident(schema.as_str()))
    }

    fn rename_schema_sql(&self, _from: &Ident, _to: &Ident) -> Option<String> {
        None
    }

    fn create_table_as_sql(&self, table: &QualifiedName, select: &str) -> String {
        format!("CREATE TABLE {} AS ({}) WITH DATA", self.qualified(table), select)
    }

    fn transfer_table_sql(&self, source: &QualifiedName, target_schema: &Ident) -> String {
        let target = source.in_schema(target_schema);
        format!(
            "{};\n{}",
            self.create_table_as_sql(&target, &format!("SELECT * FROM {}", self.qualified(source))),
            self.drop_table_sql(source, false)
        )
    }

    fn list_tables_sql(&self, schema: &Ident) -> String {
        format!(
            "SELECT TABNAME FROM SYSCAT.TABLES WHERE TABSCHEMA = {}",
            quote_string(schema.as_str())
        )
    }

    fn schema_exists_sql(&self, schema: &Ident) -> String {
        format!(
            "SELECT 1 FROM SYSCAT.SCHEMATA WHERE SCHEMANAME = {}",
            quote_string(schema.as_str())
        )
    }

    fn list_schemas_sql(&self) -> String {
        "SELECT SCHEMANAME FROM SYSCAT.SCHEMATA".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_is_copy_then_drop() {
        let source = QualifiedName::parse("load__tmp_x.orders").unwrap();
        assert_eq!(
            Db2.transfer_table_sql(&source, &Ident::new("load").unwrap()),
            "CREATE TABLE \"load\".\"orders\" AS (SELECT * FROM \"load__tmp_x\".\"orders\") WITH DATA;\n\
             DROP TABLE \"load__tmp_x\".\"orders\""
        );
    }

    #[test]
    fn test_drop_schema_is_restrict() {
        let schema = Ident::new("load").unwrap();
        assert_eq!(Db2.drop_schema_sql(&schema, true, true), "DROP SCHEMA \"load\" RESTRICT");
        assert!(Db2.list_tables_sql(&schema).contains("SYSCAT.TABLES"));
    }
}
