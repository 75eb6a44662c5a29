//! Microsoft SQL Server (T-SQL).

use super::{quote_string, DialectKind, SqlDialect, SwapStrategy};
use crate::catalog::{DataType, Ident, QualifiedName};
use crate::sql::LiteralValue;

/// No schema rename. Tables move with `ALTER SCHEMA .. TRANSFER`, which is
/// not wrapped in a transaction here, so the swap runs in two phases.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mssql;

impl SqlDialect for Mssql {
    fn kind(&self) -> DialectKind {
        DialectKind::Mssql
    }

    fn type_name(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Text | DataType::Json => "NVARCHAR(MAX)",
            DataType::Integer => "BIGINT",
            DataType::Float => "FLOAT",
            DataType::Boolean => "BIT",
            DataType::Timestamp => "DATETIME2",
            DataType::Uuid => "UNIQUEIDENTIFIER",
        }
    }

    fn swap_strategy(&self) -> SwapStrategy {
        SwapStrategy::TransferTables
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn limit_style(&self) -> super::LimitStyle {
        super::LimitStyle::Top
    }

    fn supports_drop_cascade(&self) -> bool {
        false
    }

    fn concat_operator(&self) -> &'static str {
        "+"
    }

    fn render_literal(&self, value: &LiteralValue) -> String {
        match value {
            LiteralValue::Boolean(b) => u8::from(*b).to_string(),
            LiteralValue::String(s) => format!("N{}", quote_string(s)),
            LiteralValue::Null => "NULL".to_string(),
            LiteralValue::Integer(n) => n.to_string(),
            LiteralValue::Float(f) => format!("{:?}", f),
        }
    }

    fn begin_sql(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT TRANSACTION"
    }

    fn create_schema_sql(&self, schema: &Ident, if_not_exists: bool) -> String {
        let create = format!("CREATE SCHEMA {}", self.quote_ident(schema.as_str()));
        if !if_not_exists {
            return create;
        }
        // CREATE SCHEMA must be alone in its batch
        format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = {}) EXEC({})",
            quote_string(schema.as_str()),
            quote_string(&create)
        )
    }

    fn drop_schema_sql(&self, schema: &Ident, if_exists: bool, _cascade: bool) -> String {
        format!(
            "DROP SCHEMA {}{}",
            if if_exists { "IF EXISTS " } else { "" },
            self.quote_ident(schema.as_str())
        )
    }

    fn rename_schema_sql(&self, _from: &Ident, _to: &Ident) -> Option<String> {
        None
    }

    fn create_table_as_sql(&self, table: &QualifiedName, select: &str) -> String {
        format!(
            "SELECT * INTO {} FROM ({}) AS {}",
            self.qualified(table),
            select,
            self.quote_ident("src")
        )
    }

    fn transfer_table_sql(&self, source: &QualifiedName, target_schema: &Ident) -> String {
        format!(
            "ALTER SCHEMA {} TRANSFER {}",
            self.quote_ident(target_schema.as_str()),
            self.qualified(source)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements() {
        let schema = Ident::new("load").unwrap();
        assert_eq!(
            Mssql.create_schema_sql(&schema, true),
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = 'load') EXEC('CREATE SCHEMA [load]')"
        );
        assert_eq!(Mssql.drop_schema_sql(&schema, true, true), "DROP SCHEMA IF EXISTS [load]");

        let source = QualifiedName::parse("load__tmp_x.orders").unwrap();
        assert_eq!(
            Mssql.transfer_table_sql(&source, &schema),
            "ALTER SCHEMA [load] TRANSFER [load__tmp_x].[orders]"
        );
    }

    #[test]
    fn test_create_table_as_uses_select_into() {
        let table = QualifiedName::parse("report.top").unwrap();
        assert_eq!(
            Mssql.create_table_as_sql(&table, "SELECT 1 AS [x]"),
            "SELECT * INTO [report].[top] FROM (SELECT 1 AS [x]) AS [src]"
        );
    }

    #[test]
    fn test_quoting_escapes_brackets() {
        assert_eq!(Mssql.quote_ident("a]b"), "[a]]b]");
        assert_eq!(Mssql.render_literal(&LiteralValue::from("x")), "N'x'");
    }
}
