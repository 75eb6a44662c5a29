//! Typed SQL model shared by the dialects and the local engine.
//!
//! Statements and queries are built as values, rendered per dialect by
//! [`crate::dialect`], and executed directly by the local engine. SQL text
//! handed to the local engine goes through [`Parser`], which uses
//! `sqlparser` and converts to the same types.

mod ast;
mod error;
pub mod eval;
mod parser;

pub use ast::*;
pub use error::{EvalError, EvalResult, ParseError, ParseResult};
pub use parser::Parser;
