//! Typed statements and queries to dialect SQL text.

use super::{LimitStyle, SqlDialect};
use crate::catalog::ColumnDef;
use crate::driver::{DriverError, DriverResult};
use crate::sql::{BinaryOperator, Expr, Query, QuerySource, Statement, UnaryOperator};

/// Render one statement. Batches render as a `;`-separated script, wrapped
/// in the dialect's transaction statements when transactional.
pub fn render_statement(d: &dyn SqlDialect, statement: &Statement) -> DriverResult<String> {
    let sql = match statement {
        Statement::CreateSchema { name, if_not_exists } => d.create_schema_sql(name, *if_not_exists),
        Statement::DropSchema {
            name,
            if_exists,
            cascade,
        } => d.drop_schema_sql(name, *if_exists, *cascade && d.supports_drop_cascade()),
        Statement::RenameSchema { from, to } => d.rename_schema_sql(from, to).ok_or_else(|| {
            DriverError::Unsupported(format!("{} cannot rename schema {} to {}", d.kind(), from, to))
        })?,
        Statement::CreateTable { name, columns } => {
            let columns: Vec<String> = columns.iter().map(|c| render_column(d, c)).collect();
            format!("CREATE TABLE {} ({})", d.qualified(name), columns.join(", "))
        }
        Statement::DropTable { name, if_exists } => d.drop_table_sql(name, *if_exists),
        Statement::CreateTableAs { name, query } => d.create_table_as_sql(name, &render_query(d, query)),
        Statement::CopyTable { source, target } => {
            d.create_table_as_sql(target, &render_query(d, &Query::scan(source.clone())))
        }
        Statement::TransferTable { source, target_schema } => d.transfer_table_sql(source, target_schema),
        Statement::Batch {
            statements,
            transactional,
        } => {
            let mut parts = Vec::with_capacity(statements.len() + 2);
            if *transactional {
                parts.push(d.begin_sql().to_string());
            }
            for st in statements {
                parts.push(render_statement(d, st)?);
            }
            if *transactional {
                parts.push(d.commit_sql().to_string());
            }
            parts.join(";\n")
        }
        Statement::Raw(sql) => sql.clone(),
    };
    Ok(sql)
}

fn render_column(d: &dyn SqlDialect, column: &ColumnDef) -> String {
    let mut out = format!("{} {}", d.quote_ident(&column.name), d.type_name(column.data_type));
    if !column.nullable {
        out.push_str(" NOT NULL");
    }
    out
}

/// Render a SELECT. SQL-text sources with nothing layered on top pass
/// through unchanged.
pub fn render_query(d: &dyn SqlDialect, query: &Query) -> String {
    let from = match &query.source {
        QuerySource::Sql(sql) if query.is_passthrough() => return sql.trim().trim_end_matches(';').to_string(),
        QuerySource::Sql(sql) => format!(
            "({}) AS {}",
            sql.trim().trim_end_matches(';'),
            d.quote_ident("src")
        ),
        QuerySource::Table(table) => d.qualified(table),
    };

    let projection = if query.projection.is_empty() {
        "*".to_string()
    } else {
        query
            .projection
            .iter()
            .map(|c| d.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut sql = String::from("SELECT ");
    if let (Some(n), LimitStyle::Top) = (query.limit, d.limit_style()) {
        sql.push_str(&format!("TOP {} ", n));
    }
    sql.push_str(&projection);
    sql.push_str(" FROM ");
    sql.push_str(&from);

    if let Some(filter) = &query.filter {
        sql.push_str(" WHERE ");
        sql.push_str(&render_expr(d, filter));
    }

    if !query.order_by.is_empty() {
        let items: Vec<String> = query
            .order_by
            .iter()
            .map(|o| format!("{} {}", d.quote_ident(&o.column), if o.ascending { "ASC" } else { "DESC" }))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&items.join(", "));
    }

    match (query.limit, d.limit_style()) {
        (Some(n), LimitStyle::Limit) => sql.push_str(&format!(" LIMIT {}", n)),
        (Some(n), LimitStyle::FetchFirst) => sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", n)),
        _ => {}
    }
    sql
}

pub fn render_expr(d: &dyn SqlDialect, expr: &Expr) -> String {
    match expr {
        Expr::Column(name) => d.quote_ident(name),
        Expr::Literal(value) => d.render_literal(value),
        Expr::BinaryOp { left, op, right } => format!(
            "{} {} {}",
            render_operand(d, left),
            binary_operator(d, *op),
            render_operand(d, right)
        ),
        Expr::UnaryOp { op, expr } => match op {
            UnaryOperator::Not => format!("NOT {}", render_operand(d, expr)),
            UnaryOperator::Minus => format!("-{}", render_operand(d, expr)),
            UnaryOperator::Plus => format!("+{}", render_operand(d, expr)),
        },
        Expr::IsNull { expr, negated } => format!(
            "{} IS {}NULL",
            render_operand(d, expr),
            if *negated { "NOT " } else { "" }
        ),
        Expr::InList { expr, list, negated } => format!(
            "{} {}IN ({})",
            render_operand(d, expr),
            if *negated { "NOT " } else { "" },
            list.iter().map(|e| render_expr(d, e)).collect::<Vec<_>>().join(", ")
        ),
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => format!(
            "{} {}BETWEEN {} AND {}",
            render_operand(d, expr),
            if *negated { "NOT " } else { "" },
            render_operand(d, low),
            render_operand(d, high)
        ),
        Expr::Like { expr, pattern, negated } => format!(
            "{} {}LIKE {}",
            render_operand(d, expr),
            if *negated { "NOT " } else { "" },
            super::quote_string(pattern)
        ),
        Expr::Nested(inner) => format!("({})", render_expr(d, inner)),
    }
}

/// Compound operands are parenthesized so precedence never depends on the
/// target database.
fn render_operand(d: &dyn SqlDialect, expr: &Expr) -> String {
    match expr {
        Expr::Column(_) | Expr::Literal(_) | Expr::Nested(_) => render_expr(d, expr),
        other => format!("({})", render_expr(d, other)),
    }
}

fn binary_operator(d: &dyn SqlDialect, op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
        BinaryOperator::Plus => "+",
        BinaryOperator::Minus => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "%",
        BinaryOperator::Concat => d.concat_operator(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, Ident, QualifiedName};
    use crate::dialect::{Db2, DuckDb, Mssql, Postgres};
    use sqlparser::dialect::{DuckDbDialect, GenericDialect, MsSqlDialect, PostgreSqlDialect};
    use sqlparser::parser::Parser as SqlParser;

    fn qualified(s: &str) -> QualifiedName {
        QualifiedName::parse(s).unwrap()
    }

    fn sample_query() -> Query {
        Query::scan(qualified("load.customers"))
            .select(["id", "name"])
            .filter(Expr::col("id").gt(Expr::lit(1)).and(Expr::col("name").is_null()))
            .order_by("id", false)
            .limit(10)
    }

    fn create_table() -> Statement {
        Statement::CreateTable {
            name: qualified("load.customers"),
            columns: vec![
                ColumnDef::new("id", DataType::Integer).not_null(),
                ColumnDef::new("name", DataType::Text),
            ],
        }
    }

    #[test]
    fn test_postgres_rendering_parses() {
        let query = render_query(&Postgres, &sample_query());
        assert_eq!(
            query,
            "SELECT \"id\", \"name\" FROM \"load\".\"customers\" WHERE (\"id\" > 1) AND (\"name\" IS NULL) \
             ORDER BY \"id\" DESC LIMIT 10"
        );
        SqlParser::parse_sql(&PostgreSqlDialect {}, &query).unwrap();

        let ddl = render_statement(&Postgres, &create_table()).unwrap();
        assert_eq!(ddl, "CREATE TABLE \"load\".\"customers\" (\"id\" BIGINT NOT NULL, \"name\" TEXT)");
        SqlParser::parse_sql(&PostgreSqlDialect {}, &ddl).unwrap();
    }

    #[test]
    fn test_duckdb_rendering_parses() {
        let ctas = Statement::CreateTableAs {
            name: qualified("report.top"),
            query: sample_query(),
        };
        let sql = render_statement(&DuckDb, &ctas).unwrap();
        assert!(sql.starts_with("CREATE TABLE \"report\".\"top\" AS SELECT"));
        SqlParser::parse_sql(&DuckDbDialect {}, &sql).unwrap();

        let ddl = render_statement(&DuckDb, &create_table()).unwrap();
        assert!(ddl.contains("\"name\" VARCHAR"));
        SqlParser::parse_sql(&DuckDbDialect {}, &ddl).unwrap();
    }

    #[test]
    fn test_mssql_rendering_parses() {
        let query = render_query(&Mssql, &sample_query());
        assert!(query.starts_with("SELECT TOP 10 [id], [name] FROM [load].[customers]"));
        assert!(!query.contains("LIMIT"));
        SqlParser::parse_sql(&MsSqlDialect {}, &query).unwrap();

        let ddl = render_statement(&Mssql, &create_table()).unwrap();
        assert_eq!(ddl, "CREATE TABLE [load].[customers] ([id] BIGINT NOT NULL, [name] NVARCHAR(MAX))");
        SqlParser::parse_sql(&MsSqlDialect {}, &ddl).unwrap();
    }

    #[test]
    fn test_db2_rendering() {
        let query = render_query(&Db2, &sample_query());
        assert!(query.ends_with("ORDER BY \"id\" DESC FETCH FIRST 10 ROWS ONLY"));
        SqlParser::parse_sql(&GenericDialect {}, &query).unwrap();

        let copy = Statement::CopyTable {
            source: qualified("load.customers"),
            target: qualified("load__prev.customers"),
        };
        assert_eq!(
            render_statement(&Db2, &copy).unwrap(),
            "CREATE TABLE \"load__prev\".\"customers\" AS (SELECT * FROM \"load\".\"customers\") WITH DATA"
        );
    }

    #[test]
    fn test_rename_unsupported_outside_postgres() {
        let rename = Statement::RenameSchema {
            from: Ident::new("a").unwrap(),
            to: Ident::new("b").unwrap(),
        };
        assert_eq!(
            render_statement(&Postgres, &rename).unwrap(),
            "ALTER SCHEMA \"a\" RENAME TO \"b\""
        );
        let without_rename: [&dyn SqlDialect; 3] = [&Mssql, &Db2, &DuckDb];
        for dialect in without_rename {
            assert!(matches!(
                render_statement(dialect, &rename),
                Err(DriverError::Unsupported(_))
            ));
        }
    }

    #[test]
    fn test_batch_and_passthrough() {
        let batch = Statement::Batch {
            statements: vec![
                Statement::drop_table(&qualified("load.a"), true),
                Statement::drop_table(&qualified("load.b"), true),
            ],
            transactional: true,
        };
        let sql = render_statement(&Postgres, &batch).unwrap();
        assert_eq!(
            sql,
            "BEGIN;\nDROP TABLE IF EXISTS \"load\".\"a\";\nDROP TABLE IF EXISTS \"load\".\"b\";\nCOMMIT"
        );
        assert_eq!(SqlParser::parse_sql(&PostgreSqlDialect {}, &sql).unwrap().len(), 4);

        assert_eq!(render_query(&Postgres, &Query::sql("SELECT 1;")), "SELECT 1");
        assert_eq!(
            render_query(&Postgres, &Query::sql("SELECT 1").limit(1)),
            "SELECT * FROM (SELECT 1) AS \"src\" LIMIT 1"
        );
    }

    #[test]
    fn test_literals_per_dialect() {
        let expr = Expr::col("active").equals(Expr::lit(true));
        assert_eq!(render_expr(&Postgres, &expr), "\"active\" = TRUE");
        assert_eq!(render_expr(&Mssql, &expr), "[active] = 1");
        assert_eq!(render_expr(&Postgres, &Expr::lit("it's")), "'it''s'");
    }
}
