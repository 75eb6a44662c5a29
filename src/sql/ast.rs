//! Typed statements and queries.
//!
//! The store never builds SQL strings itself: it builds these values and a
//! dialect renders them. The local engine executes them directly.

use std::collections::BTreeSet;

use super::error::ParseResult;
use super::parser::Parser;
use crate::catalog::{ColumnDef, Ident, QualifiedName};

/// A schema or table statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateSchema {
        name: Ident,
        if_not_exists: bool,
    },
    DropSchema {
        name: Ident,
        if_exists: bool,
        cascade: bool,
    },
    RenameSchema {
        from: Ident,
        to: Ident,
    },
    CreateTable {
        name: QualifiedName,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        name: QualifiedName,
        if_exists: bool,
    },
    /// CREATE TABLE .. AS SELECT
    CreateTableAs {
        name: QualifiedName,
        query: Query,
    },
    /// Copy structure and data of `source` into a new table `target`.
    CopyTable {
        source: QualifiedName,
        target: QualifiedName,
    },
    /// Move a table into another schema, keeping its name.
    TransferTable {
        source: QualifiedName,
        target_schema: Ident,
    },
    /// Several statements; `transactional` batches apply all or nothing.
    Batch {
        statements: Vec<Statement>,
        transactional: bool,
    },
    /// SQL text passed through untouched.
    Raw(String),
}

impl Statement {
    pub fn create_schema(name: &Ident) -> Self {
        Statement::CreateSchema {
            name: name.clone(),
            if_not_exists: false,
        }
    }

    pub fn drop_schema(name: &Ident, if_exists: bool, cascade: bool) -> Self {
        Statement::DropSchema {
            name: name.clone(),
            if_exists,
            cascade,
        }
    }

    pub fn drop_table(name: &QualifiedName, if_exists: bool) -> Self {
        Statement::DropTable {
            name: name.clone(),
            if_exists,
        }
    }

    /// short tag for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateSchema { .. } => "create_schema",
            Statement::DropSchema { .. } => "drop_schema",
            Statement::RenameSchema { .. } => "rename_schema",
            Statement::CreateTable { .. } => "create_table",
            Statement::DropTable { .. } => "drop_table",
            Statement::CreateTableAs { .. } => "create_table_as",
            Statement::CopyTable { .. } => "copy_table",
            Statement::TransferTable { .. } => "transfer_table",
            Statement::Batch { .. } => "batch",
            Statement::Raw(_) => "raw",
        }
    }
}

/// Where a query reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySource {
    Table(QualifiedName),
    /// A SELECT given as SQL text, used as a derived table.
    Sql(String),
}

/// A single-table SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub source: QuerySource,
    /// empty means every column
    pub projection: Vec<String>,
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    /// `SELECT * FROM table`
    pub fn scan(table: QualifiedName) -> Self {
        Self::from_source(QuerySource::Table(table))
    }

    /// wrap SQL text as the query source
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::from_source(QuerySource::Sql(sql.into()))
    }

    fn from_source(source: QuerySource) -> Self {
        Self {
            source,
            projection: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add a predicate; repeated calls are AND-ed.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Tables the query reads.
    pub fn source_tables(&self) -> ParseResult<BTreeSet<QualifiedName>> {
        match &self.source {
            QuerySource::Table(table) => Ok(BTreeSet::from([table.clone()])),
            QuerySource::Sql(sql) => Parser::source_tables(sql),
        }
    }

    /// true when the query is SQL text with nothing layered on top
    pub fn is_passthrough(&self) -> bool {
        matches!(self.source, QuerySource::Sql(_))
            && self.projection.is_empty()
            && self.filter.is_none()
            && self.order_by.is_empty()
            && self.limit.is_none()
    }
}

/// ORDER BY clause item.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Predicate and value expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(LiteralValue),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },
    Nested(Box<Expr>),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn lit(value: impl Into<LiteralValue>) -> Self {
        Expr::Literal(value.into())
    }

    fn binary(self, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn equals(self, right: Expr) -> Self {
        self.binary(BinaryOperator::Eq, right)
    }

    pub fn not_equals(self, right: Expr) -> Self {
        self.binary(BinaryOperator::NotEq, right)
    }

    pub fn gt(self, right: Expr) -> Self {
        self.binary(BinaryOperator::Gt, right)
    }

    pub fn lt(self, right: Expr) -> Self {
        self.binary(BinaryOperator::Lt, right)
    }

    pub fn and(self, right: Expr) -> Self {
        self.binary(BinaryOperator::And, right)
    }

    pub fn or(self, right: Expr) -> Self {
        self.binary(BinaryOperator::Or, right)
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }
}

/// Literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl LiteralValue {
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            LiteralValue::Null => Value::Null,
            LiteralValue::Boolean(b) => Value::Bool(*b),
            LiteralValue::Integer(n) => Value::Number((*n).into()),
            LiteralValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            LiteralValue::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<i64> for LiteralValue {
    fn from(v: i64) -> Self {
        LiteralValue::Integer(v)
    }
}

impl From<i32> for LiteralValue {
    fn from(v: i32) -> Self {
        LiteralValue::Integer(v.into())
    }
}

impl From<f64> for LiteralValue {
    fn from(v: f64) -> Self {
        LiteralValue::Float(v)
    }
}

impl From<bool> for LiteralValue {
    fn from(v: bool) -> Self {
        LiteralValue::Boolean(v)
    }
}

impl From<&str> for LiteralValue {
    fn from(v: &str) -> Self {
        LiteralValue::String(v.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(v: String) -> Self {
        LiteralValue::String(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    // String
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}
