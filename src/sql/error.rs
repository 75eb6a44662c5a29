//! SQL parsing and evaluation errors.

use thiserror::Error;

use crate::catalog::InvalidNameError;

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// SQL parsing errors.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("empty query")]
    EmptyQuery,

    #[error("multiple statements not supported")]
    MultipleStatements,
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        ParseError::Syntax(e.to_string())
    }
}

impl From<InvalidNameError> for ParseError {
    fn from(e: InvalidNameError) -> Self {
        ParseError::InvalidIdentifier(e.to_string())
    }
}

/// Result type for expression evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors raised while evaluating an expression against a row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("division by zero")]
    DivisionByZero,
}
