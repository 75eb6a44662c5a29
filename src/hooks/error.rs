use std::fmt;

use thiserror::Error;

use crate::dialect::DialectExecutionError;
use crate::table::{PayloadType, RawSqlError, RowSetError};

pub type HookResult<T> = Result<T, HookError>;

/// Failure inside a hook.
#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Dialect(#[from] DialectExecutionError),

    #[error("hook expected a {expected} payload, got {found}")]
    PayloadMismatch {
        expected: &'static str,
        found: PayloadType,
    },

    #[error("invalid rows: {0}")]
    InvalidRows(#[from] RowSetError),

    #[error("cannot bind sql: {0}")]
    RawSql(#[from] RawSqlError),

    /// Conversion to or from a foreign representation failed.
    #[error("conversion failed: {0}")]
    Conversion(String),
}

impl HookError {
    pub fn mismatch<T: 'static>(found: PayloadType) -> Self {
        HookError::PayloadMismatch {
            expected: std::any::type_name::<T>(),
            found,
        }
    }

    pub fn dialect_error(&self) -> Option<&DialectExecutionError> {
        match self {
            HookError::Dialect(e) => Some(e),
            _ => None,
        }
    }
}

/// Which way a table is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Materialize,
    Retrieve,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Materialize => f.write_str("materialize"),
            Direction::Retrieve => f.write_str("retrieve"),
        }
    }
}

/// No registered hook accepts the payload type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no hook can {direction} payloads of type {payload_type}")]
pub struct NoHookFound {
    pub payload_type: PayloadType,
    pub direction: Direction,
}
