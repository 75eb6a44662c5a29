use thiserror::Error;

use super::DialectKind;
use crate::driver::DriverError;

pub type DialectResult<T> = Result<T, DialectExecutionError>;

/// A statement the database (or the renderer) refused.
#[derive(Debug, Error)]
#[error("{dialect} failed to execute `{statement}`: {source}")]
pub struct DialectExecutionError {
    pub dialect: DialectKind,
    /// rendered SQL, or a description for calls without SQL text
    pub statement: String,
    #[source]
    pub source: DriverError,
}

impl DialectExecutionError {
    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }

    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.source, DriverError::Unsupported(_))
    }
}
