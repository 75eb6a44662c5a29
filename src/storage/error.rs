//! Storage layer error types

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::catalog::{Ident, InvalidNameError, QualifiedName};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("schema not found: {0}")]
    SchemaNotFound(Ident),

    #[error("schema already exists: {0}")]
    SchemaAlreadyExists(Ident),

    /// non-cascading drop of a schema that still holds tables
    #[error("schema {schema} is not empty ({tables} tables)")]
    SchemaNotEmpty { schema: Ident, tables: usize },

    #[error("table not found: {0}")]
    TableNotFound(QualifiedName),

    #[error("table already exists: {0}")]
    TableAlreadyExists(QualifiedName),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// data integrity check failed
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: String, reason: String },

    /// the row data doesn't match the table's columns
    #[error("schema violation in {table}: {reason}")]
    SchemaViolation { table: QualifiedName, reason: String },

    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// the repository lock could not be taken in time
    #[error("timed out after {0:?} waiting for the repository lock")]
    LockTimeout(Duration),

    /// a schema ref moved underneath us
    #[error("concurrent modification of schema {0}")]
    ConcurrentModification(Ident),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::SchemaNotFound(_) | StorageError::TableNotFound(_)
        )
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::SchemaAlreadyExists(_)
                | StorageError::TableAlreadyExists(_)
                | StorageError::SchemaNotEmpty { .. }
                | StorageError::ConcurrentModification(_)
        )
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            StorageError::LockTimeout(_) | StorageError::ConcurrentModification(_)
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let name = QualifiedName::parse("load.customers").unwrap();
        let not_found = StorageError::TableNotFound(name.clone());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let conflict = StorageError::TableAlreadyExists(name);
        assert!(!conflict.is_not_found());
        assert!(conflict.is_conflict());

        let timeout = StorageError::LockTimeout(Duration::from_millis(5));
        assert!(timeout.is_retriable());
        assert!(!timeout.is_conflict());
    }
}
