//! Driver errors.

use std::time::Duration;

use thiserror::Error;

use crate::sql::{EvalError, ParseError};
use crate::storage::StorageError;

pub type DriverResult<T> = Result<T, DriverError>;

/// Errors a [`super::Connection`] reports back to the dialect layer.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("unsupported statement: {0}")]
    Unsupported(String),

    #[error("query evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error("cannot parse sql: {0}")]
    Parse(#[from] ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Free-form failure reported by an external driver.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::Storage(e) if e.is_not_found())
    }

    /// Whether running the same statement again could succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            DriverError::Timeout(_) => true,
            DriverError::Storage(e) => e.is_retriable(),
            _ => false,
        }
    }
}

impl From<StorageError> for DriverError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::LockTimeout(after) => DriverError::Timeout(after),
            other => DriverError::Storage(other),
        }
    }
}
