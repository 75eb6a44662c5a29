use std::time::Duration;

use thiserror::Error;

use crate::cache::MetadataError;
use crate::catalog::{Ident, InvalidNameError};
use crate::dialect::{DialectExecutionError, DialectKind};
use crate::hooks::{HookError, NoHookFound};
use crate::stage::{StageError, StageState};
use crate::table::{PayloadType, TableRef};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by [`crate::TableStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No hook accepts the payload type. A configuration error.
    #[error(transparent)]
    NoHookFound(#[from] NoHookFound),

    #[error("failed to materialize {stage}.{table} on {dialect}: {source}")]
    Materialization {
        stage: Ident,
        table: Ident,
        dialect: DialectKind,
        #[source]
        source: HookError,
    },

    #[error("failed to retrieve {table}: {source}")]
    Retrieval {
        table: TableRef,
        #[source]
        source: RetrievalCause,
    },

    /// The table is not in the published schema of its stage.
    #[error("table {table} not found")]
    TableNotFound { table: TableRef },

    #[error("stage {stage}: {source}")]
    DialectExecution {
        stage: Ident,
        #[source]
        source: DialectExecutionError,
    },

    /// A statement not tied to one stage failed.
    #[error(transparent)]
    Database(#[from] DialectExecutionError),

    #[error("stage {stage} is {state}, cannot {operation}")]
    InvalidStageState {
        stage: Ident,
        state: StageState,
        operation: &'static str,
    },

    #[error("table {table} was already materialized in this run of stage {stage}")]
    DuplicateTable { stage: Ident, table: Ident },

    #[error("table belongs to stage {found}, handle is for stage {expected}")]
    StageMismatch { expected: Ident, found: Ident },

    #[error("timed out after {timeout:?} waiting to commit stage {stage}")]
    LockTimeout { stage: Ident, timeout: Duration },

    /// Commit asked for while materialize calls of the stage are running.
    /// The stage stays `Materializing`.
    #[error("cannot commit stage {stage} while {} table(s) are still being written", .tables.len())]
    TablesInFlight { stage: Ident, tables: Vec<Ident> },

    #[error("commit of stage {stage} failed: {source}")]
    Commit {
        stage: Ident,
        #[source]
        source: DialectExecutionError,
    },

    /// The published copy of a cache-hit table changed after the stage began.
    #[error("cached table {stage}.{table} was replaced by another commit")]
    StaleCacheHit { stage: Ident, table: Ident },

    #[error("metadata of stage {stage} is unreadable: {source}")]
    Metadata {
        stage: Ident,
        #[source]
        source: MetadataError,
    },

    #[error("expected a {expected} payload, retrieved {found}")]
    PayloadMismatch {
        expected: &'static str,
        found: PayloadType,
    },

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),
}

/// Why a retrieve failed after the table was found.
#[derive(Debug, Error)]
pub enum RetrievalCause {
    #[error(transparent)]
    NoHook(#[from] NoHookFound),

    #[error(transparent)]
    Hook(#[from] HookError),
}

impl StoreError {
    fn dialect_source(&self) -> Option<&DialectExecutionError> {
        match self {
            StoreError::DialectExecution { source, .. } | StoreError::Commit { source, .. } => Some(source),
            StoreError::Database(source) => Some(source),
            StoreError::Materialization { source, .. } => source.dialect_error(),
            StoreError::Retrieval {
                source: RetrievalCause::Hook(source),
                ..
            } => source.dialect_error(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::TableNotFound { .. } => true,
            other => other.dialect_source().is_some_and(|e| e.is_not_found()),
        }
    }

    /// Whether running the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::LockTimeout { .. } | StoreError::StaleCacheHit { .. } | StoreError::TablesInFlight { .. } => {
                true
            }
            other => other.dialect_source().is_some_and(|e| e.is_timeout()),
        }
    }
}

impl From<StageError> for StoreError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::InvalidState {
                stage,
                state,
                operation,
            } => StoreError::InvalidStageState {
                stage,
                state,
                operation,
            },
            StageError::DuplicateTable { stage, table } => StoreError::DuplicateTable { stage, table },
            StageError::LockTimeout { stage, timeout } => StoreError::LockTimeout { stage, timeout },
            StageError::TablesInFlight { stage, tables } => StoreError::TablesInFlight { stage, tables },
        }
    }
}
