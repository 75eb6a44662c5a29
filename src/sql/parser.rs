//! SQL text frontend.
//!
//! Converts SQL strings to typed statements using sqlparser. Only what the
//! store and the local engine need is accepted: schema DDL, CREATE TABLE
//! (with columns or AS SELECT), DROP and single-table SELECTs.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use super::ast::*;
use super::error::{ParseError, ParseResult};
use crate::catalog::{ColumnDef, DataType, Ident, QualifiedName};

pub struct Parser;

impl Parser {
    /// Parse exactly one statement.
    pub fn parse(sql: &str) -> ParseResult<Statement> {
        let stmt = Self::parse_single(sql)?;
        Self::convert_statement(&stmt)
    }

    /// Parse a `;`-separated script.
    pub fn parse_script(sql: &str) -> ParseResult<Vec<Statement>> {
        let statements = SqlParser::parse_sql(&GenericDialect {}, sql)?;
        if statements.is_empty() {
            return Err(ParseError::EmptyQuery);
        }
        statements.iter().map(Self::convert_statement).collect()
    }

    /// Parse a single SELECT.
    pub fn parse_query(sql: &str) -> ParseResult<Query> {
        match Self::parse_single(sql)? {
            sp::Statement::Query(query) => Self::convert_query(&query),
            other => Err(ParseError::UnsupportedStatement(format!(
                "expected a query, found: {}",
                other
            ))),
        }
    }

    /// Every `schema.table` a SELECT reads, anywhere in the statement.
    /// Unqualified names (CTEs, tables outside any stage) are skipped.
    pub fn source_tables(sql: &str) -> ParseResult<BTreeSet<QualifiedName>> {
        let stmt = Self::parse_single(sql)?;
        if !matches!(stmt, sp::Statement::Query(_)) {
            return Err(ParseError::UnsupportedStatement(format!("expected a query, found: {}", stmt)));
        }

        let mut sources = BTreeSet::new();
        let flow = sp::visit_relations(&stmt, |name| {
            if name.0.len() == 1 {
                return ControlFlow::Continue(());
            }
            match Self::qualified_name(name) {
                Ok(qualified) => {
                    sources.insert(qualified);
                    ControlFlow::Continue(())
                }
                Err(e) => ControlFlow::Break(e),
            }
        });
        match flow {
            ControlFlow::Break(e) => Err(e),
            ControlFlow::Continue(()) => Ok(sources),
        }
    }

    fn parse_single(sql: &str) -> ParseResult<sp::Statement> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        let mut statements = SqlParser::parse_sql(&GenericDialect {}, sql)?;
        match statements.len() {
            0 => Err(ParseError::EmptyQuery),
            1 => Ok(statements.remove(0)),
            _ => Err(ParseError::MultipleStatements),
        }
    }

    fn convert_statement(stmt: &sp::Statement) -> ParseResult<Statement> {
        match stmt {
            sp::Statement::CreateSchema {
                schema_name,
                if_not_exists,
                ..
            } => Self::convert_create_schema(schema_name, *if_not_exists),
            sp::Statement::CreateTable(create) => Self::convert_create_table(create),
            sp::Statement::Drop {
                object_type,
                names,
                if_exists,
                cascade,
                ..
            } => Self::convert_drop(object_type, names, *if_exists, *cascade),
            other => Err(ParseError::UnsupportedStatement(other.to_string())),
        }
    }

    fn convert_create_schema(name: &sp::SchemaName, if_not_exists: bool) -> ParseResult<Statement> {
        match name {
            sp::SchemaName::Simple(name) => Ok(Statement::CreateSchema {
                name: Self::single_ident(name)?,
                if_not_exists,
            }),
            other => Err(ParseError::UnsupportedStatement(format!(
                "CREATE SCHEMA {}",
                other
            ))),
        }
    }

    fn convert_create_table(create: &sp::CreateTable) -> ParseResult<Statement> {
        let name = Self::qualified_name(&create.name)?;

        if let Some(query) = &create.query {
            return Ok(Statement::CreateTableAs {
                name,
                query: Self::convert_query(query)?,
            });
        }

        let columns = create
            .columns
            .iter()
            .map(Self::convert_column_def)
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Statement::CreateTable { name, columns })
    }

    fn convert_column_def(col: &sp::ColumnDef) -> ParseResult<ColumnDef> {
        let column = ColumnDef::new(col.name.value.clone(), Self::convert_data_type(&col.data_type)?);
        let not_null = col
            .options
            .iter()
            .any(|opt| matches!(opt.option, sp::ColumnOption::NotNull));
        Ok(if not_null { column.not_null() } else { column })
    }

    fn convert_data_type(dt: &sp::DataType) -> ParseResult<DataType> {
        match dt {
            sp::DataType::Text
            | sp::DataType::Varchar(_)
            | sp::DataType::Nvarchar(_)
            | sp::DataType::CharVarying(_)
            | sp::DataType::Character(_)
            | sp::DataType::Char(_)
            | sp::DataType::String(_) => Ok(DataType::Text),

            sp::DataType::Int(_)
            | sp::DataType::Integer(_)
            | sp::DataType::BigInt(_)
            | sp::DataType::SmallInt(_)
            | sp::DataType::TinyInt(_) => Ok(DataType::Integer),

            sp::DataType::Float(_)
            | sp::DataType::Real
            | sp::DataType::Double(_)
            | sp::DataType::DoublePrecision
            | sp::DataType::Decimal(_)
            | sp::DataType::Numeric(_) => Ok(DataType::Float),

            sp::DataType::Boolean | sp::DataType::Bool => Ok(DataType::Boolean),

            sp::DataType::JSON | sp::DataType::JSONB => Ok(DataType::Json),

            sp::DataType::Timestamp(_, _) | sp::DataType::Datetime(_) | sp::DataType::Date => {
                Ok(DataType::Timestamp)
            }

            sp::DataType::Uuid => Ok(DataType::Uuid),

            other => Err(ParseError::UnsupportedDataType(other.to_string())),
        }
    }

    fn convert_drop(
        object_type: &sp::ObjectType,
        names: &[sp::ObjectName],
        if_exists: bool,
        cascade: bool,
    ) -> ParseResult<Statement> {
        let name = match names {
            [name] => name,
            _ => {
                return Err(ParseError::UnsupportedStatement(
                    "DROP of several objects at once".into(),
                ))
            }
        };

        match object_type {
            sp::ObjectType::Table => Ok(Statement::DropTable {
                name: Self::qualified_name(name)?,
                if_exists,
            }),
            sp::ObjectType::Schema => Ok(Statement::DropSchema {
                name: Self::single_ident(name)?,
                if_exists,
                cascade,
            }),
            other => Err(ParseError::UnsupportedStatement(format!("DROP {}", other))),
        }
    }

    fn convert_query(query: &sp::Query) -> ParseResult<Query> {
        let select = match query.body.as_ref() {
            sp::SetExpr::Select(s) => s,
            other => {
                return Err(ParseError::UnsupportedStatement(format!(
                    "unsupported query body: {}",
                    other
                )))
            }
        };

        let source = match select.from.as_slice() {
            [from] if from.joins.is_empty() => match &from.relation {
                sp::TableFactor::Table { name, .. } => QuerySource::Table(Self::qualified_name(name)?),
                other => {
                    return Err(ParseError::UnsupportedStatement(format!(
                        "unsupported FROM clause: {}",
                        other
                    )))
                }
            },
            _ => {
                return Err(ParseError::UnsupportedStatement(
                    "exactly one table in FROM required".into(),
                ))
            }
        };

        let projection = Self::convert_projection(&select.projection)?;

        let filter = select.selection.as_ref().map(Self::convert_expr).transpose()?;

        let order_by = match &query.order_by {
            Some(ob) => match &ob.kind {
                sp::OrderByKind::Expressions(exprs) => exprs
                    .iter()
                    .map(Self::convert_order_by_expr)
                    .collect::<ParseResult<Vec<_>>>()?,
                sp::OrderByKind::All(_) => Vec::new(),
            },
            None => Vec::new(),
        };

        let limit = query.limit.as_ref().and_then(Self::expr_to_usize);

        Ok(Query {
            source,
            projection,
            filter,
            order_by,
            limit,
        })
    }

    fn convert_projection(items: &[sp::SelectItem]) -> ParseResult<Vec<String>> {
        if let [sp::SelectItem::Wildcard(_)] = items {
            return Ok(Vec::new());
        }

        items
            .iter()
            .map(|item| match item {
                sp::SelectItem::UnnamedExpr(sp::Expr::Identifier(ident)) => Ok(ident.value.clone()),
                sp::SelectItem::UnnamedExpr(sp::Expr::CompoundIdentifier(parts)) => parts
                    .last()
                    .map(|p| p.value.clone())
                    .ok_or_else(|| ParseError::InvalidIdentifier("empty compound identifier".into())),
                other => Err(ParseError::UnsupportedExpression(format!(
                    "projection item: {}",
                    other
                ))),
            })
            .collect()
    }

    fn convert_order_by_expr(expr: &sp::OrderByExpr) -> ParseResult<OrderBy> {
        let column = match &expr.expr {
            sp::Expr::Identifier(id) => id.value.clone(),
            other => {
                return Err(ParseError::UnsupportedExpression(format!(
                    "ORDER BY expression: {}",
                    other
                )))
            }
        };
        let ascending = expr.options.asc.unwrap_or(true);
        Ok(OrderBy { column, ascending })
    }

    fn convert_expr(expr: &sp::Expr) -> ParseResult<Expr> {
        match expr {
            sp::Expr::Identifier(id) => Ok(Expr::Column(id.value.clone())),

            sp::Expr::CompoundIdentifier(parts) => {
                // table.column, the table part is implied by FROM
                let col = parts
                    .last()
                    .map(|p| p.value.clone())
                    .ok_or_else(|| ParseError::InvalidIdentifier("empty compound identifier".into()))?;
                Ok(Expr::Column(col))
            }

            sp::Expr::Value(v) => Ok(Expr::Literal(Self::convert_value(v)?)),

            sp::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(Self::convert_expr(left)?),
                op: Self::convert_binary_op(op)?,
                right: Box::new(Self::convert_expr(right)?),
            }),

            sp::Expr::UnaryOp { op, expr } => Ok(Expr::UnaryOp {
                op: Self::convert_unary_op(op)?,
                expr: Box::new(Self::convert_expr(expr)?),
            }),

            sp::Expr::IsNull(e) => Ok(Expr::IsNull {
                expr: Box::new(Self::convert_expr(e)?),
                negated: false,
            }),

            sp::Expr::IsNotNull(e) => Ok(Expr::IsNull {
                expr: Box::new(Self::convert_expr(e)?),
                negated: true,
            }),

            sp::Expr::InList { expr, list, negated } => Ok(Expr::InList {
                expr: Box::new(Self::convert_expr(expr)?),
                list: list.iter().map(Self::convert_expr).collect::<ParseResult<Vec<_>>>()?,
                negated: *negated,
            }),

            sp::Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Ok(Expr::Between {
                expr: Box::new(Self::convert_expr(expr)?),
                low: Box::new(Self::convert_expr(low)?),
                high: Box::new(Self::convert_expr(high)?),
                negated: *negated,
            }),

            sp::Expr::Like {
                expr,
                pattern,
                negated,
                ..
            } => Ok(Expr::Like {
                expr: Box::new(Self::convert_expr(expr)?),
                pattern: Self::extract_string(pattern)?,
                negated: *negated,
            }),

            sp::Expr::Nested(inner) => Ok(Expr::Nested(Box::new(Self::convert_expr(inner)?))),

            other => Err(ParseError::UnsupportedExpression(other.to_string())),
        }
    }

    fn convert_value(v: &sp::ValueWithSpan) -> ParseResult<LiteralValue> {
        match &v.value {
            sp::Value::Null => Ok(LiteralValue::Null),
            sp::Value::Boolean(b) => Ok(LiteralValue::Boolean(*b)),
            sp::Value::Number(s, _) => {
                if let Ok(i) = s.parse::<i64>() {
                    Ok(LiteralValue::Integer(i))
                } else if let Ok(f) = s.parse::<f64>() {
                    Ok(LiteralValue::Float(f))
                } else {
                    Err(ParseError::UnsupportedExpression(format!("invalid number: {}", s)))
                }
            }
            sp::Value::SingleQuotedString(s) => Ok(LiteralValue::String(s.clone())),
            other => Err(ParseError::UnsupportedExpression(format!("unsupported value: {}", other))),
        }
    }

    fn extract_string(expr: &sp::Expr) -> ParseResult<String> {
        match expr {
            sp::Expr::Value(v) => match &v.value {
                sp::Value::SingleQuotedString(s) => Ok(s.clone()),
                _ => Err(ParseError::UnsupportedExpression("expected string".into())),
            },
            _ => Err(ParseError::UnsupportedExpression("expected string literal".into())),
        }
    }

    fn convert_binary_op(op: &sp::BinaryOperator) -> ParseResult<BinaryOperator> {
        match op {
            sp::BinaryOperator::Eq => Ok(BinaryOperator::Eq),
            sp::BinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
            sp::BinaryOperator::Lt => Ok(BinaryOperator::Lt),
            sp::BinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
            sp::BinaryOperator::Gt => Ok(BinaryOperator::Gt),
            sp::BinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
            sp::BinaryOperator::And => Ok(BinaryOperator::And),
            sp::BinaryOperator::Or => Ok(BinaryOperator::Or),
            sp::BinaryOperator::Plus => Ok(BinaryOperator::Plus),
            sp::BinaryOperator::Minus => Ok(BinaryOperator::Minus),
            sp::BinaryOperator::Multiply => Ok(BinaryOperator::Multiply),
            sp::BinaryOperator::Divide => Ok(BinaryOperator::Divide),
            sp::BinaryOperator::Modulo => Ok(BinaryOperator::Modulo),
            sp::BinaryOperator::StringConcat => Ok(BinaryOperator::Concat),
            other => Err(ParseError::UnsupportedExpression(format!("operator {}", other))),
        }
    }

    fn convert_unary_op(op: &sp::UnaryOperator) -> ParseResult<UnaryOperator> {
        match op {
            sp::UnaryOperator::Not => Ok(UnaryOperator::Not),
            sp::UnaryOperator::Minus => Ok(UnaryOperator::Minus),
            sp::UnaryOperator::Plus => Ok(UnaryOperator::Plus),
            other => Err(ParseError::UnsupportedExpression(format!("unary operator {}", other))),
        }
    }

    fn name_parts(name: &sp::ObjectName) -> ParseResult<Vec<String>> {
        name.0
            .iter()
            .map(|part| {
                part.as_ident()
                    .map(|ident| ident.value.clone())
                    .ok_or_else(|| ParseError::InvalidIdentifier(part.to_string()))
            })
            .collect()
    }

    fn qualified_name(name: &sp::ObjectName) -> ParseResult<QualifiedName> {
        match Self::name_parts(name)?.as_slice() {
            [schema, table] => Ok(QualifiedName::new(Ident::new(schema.as_str())?, Ident::new(table.as_str())?)),
            _ => Err(ParseError::InvalidIdentifier(format!(
                "expected schema.table, found {}",
                name
            ))),
        }
    }

    fn single_ident(name: &sp::ObjectName) -> ParseResult<Ident> {
        match Self::name_parts(name)?.as_slice() {
            [single] => Ok(Ident::new(single.as_str())?),
            _ => Err(ParseError::InvalidIdentifier(name.to_string())),
        }
    }

    fn expr_to_usize(expr: &sp::Expr) -> Option<usize> {
        match expr {
            sp::Expr::Value(v) => match &v.value {
                sp::Value::Number(s, _) => s.parse().ok(),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualified(s: &str) -> QualifiedName {
        QualifiedName::parse(s).unwrap()
    }

    #[test]
    fn test_source_tables() {
        let sources = Parser::source_tables(
            "WITH recent AS (SELECT * FROM load.orders WHERE day > 3) \
             SELECT c.id FROM load.customers c JOIN recent r ON r.customer = c.id \
             WHERE c.region IN (SELECT region FROM ref.regions)",
        )
        .unwrap();
        assert_eq!(
            sources.into_iter().collect::<Vec<_>>(),
            vec![qualified("load.customers"), qualified("load.orders"), qualified("ref.regions")]
        );

        assert!(Parser::source_tables("SELECT 1").unwrap().is_empty());
        assert!(Parser::source_tables("SELECT * FROM db.load.orders").is_err());
        assert!(Parser::source_tables("DROP TABLE load.orders").is_err());
    }

    #[test]
    fn test_parse_create_schema() {
        let stmt = Parser::parse("CREATE SCHEMA IF NOT EXISTS load").unwrap();
        assert_eq!(
            stmt,
            Statement::CreateSchema {
                name: Ident::new("load").unwrap(),
                if_not_exists: true,
            }
        );
    }

    #[test]
    fn test_parse_drop_schema_cascade() {
        let stmt = Parser::parse("DROP SCHEMA IF EXISTS load__prev CASCADE").unwrap();
        assert_eq!(
            stmt,
            Statement::DropSchema {
                name: Ident::new("load__prev").unwrap(),
                if_exists: true,
                cascade: true,
            }
        );
    }

    #[test]
    fn test_parse_create_table() {
        let stmt = Parser::parse("CREATE TABLE load.customers (id BIGINT NOT NULL, name TEXT)").unwrap();
        match stmt {
            Statement::CreateTable { name, columns } => {
                assert_eq!(name, qualified("load.customers"));
                assert_eq!(columns.len(), 2);
                assert!(!columns[0].nullable);
                assert_eq!(columns[0].data_type, DataType::Integer);
                assert_eq!(columns[1].data_type, DataType::Text);
            }
            other => panic!("expected CreateTable, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_table_requires_schema() {
        assert!(matches!(
            Parser::parse("CREATE TABLE customers (id BIGINT)"),
            Err(ParseError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_parse_create_table_as() {
        let stmt = Parser::parse(
            "CREATE TABLE work.big_orders AS SELECT id, total FROM load.orders WHERE total > 100",
        )
        .unwrap();
        match stmt {
            Statement::CreateTableAs { name, query } => {
                assert_eq!(name, qualified("work.big_orders"));
                assert_eq!(query.source, QuerySource::Table(qualified("load.orders")));
                assert_eq!(query.projection, vec!["id".to_string(), "total".to_string()]);
                assert!(query.filter.is_some());
            }
            other => panic!("expected CreateTableAs, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_quoted_identifiers() {
        let query = Parser::parse_query(r#"SELECT * FROM "load"."customers" LIMIT 2"#).unwrap();
        assert_eq!(query.source, QuerySource::Table(qualified("load.customers")));
        assert!(query.projection.is_empty());
        assert_eq!(query.limit, Some(2));
    }

    #[test]
    fn test_parse_query_order_and_predicates() {
        let query = Parser::parse_query(
            "SELECT name FROM load.customers WHERE id IN (1, 2) AND name LIKE 'a%' ORDER BY name DESC",
        )
        .unwrap();
        assert_eq!(query.order_by, vec![OrderBy { column: "name".into(), ascending: false }]);
        assert!(matches!(
            query.filter,
            Some(Expr::BinaryOp { op: BinaryOperator::And, .. })
        ));
    }

    #[test]
    fn test_parse_drop_table() {
        let stmt = Parser::parse("DROP TABLE IF EXISTS load.customers").unwrap();
        assert_eq!(stmt, Statement::drop_table(&qualified("load.customers"), true));
    }

    #[test]
    fn test_parse_script() {
        let stmts = Parser::parse_script("CREATE SCHEMA a; CREATE SCHEMA b").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(Parser::parse("CREATE SCHEMA a; CREATE SCHEMA b"), Err(ParseError::MultipleStatements)));
    }

    #[test]
    fn test_unsupported_and_empty() {
        assert!(matches!(Parser::parse("   "), Err(ParseError::EmptyQuery)));
        assert!(matches!(
            Parser::parse("INSERT INTO load.t VALUES (1)"),
            Err(ParseError::UnsupportedStatement(_))
        ));
        assert!(matches!(
            Parser::parse_query("SELECT * FROM a.x JOIN a.y ON x.id = y.id"),
            Err(ParseError::UnsupportedStatement(_))
        ));
    }
}
