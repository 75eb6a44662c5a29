//! The staged-schema commit protocol.
//!
//! Every run of a stage writes into its own working schema. Nothing in it is
//! visible until the commit swaps it into the published schema, so readers
//! see either the previous run's tables or this run's, never a mix.

mod handle;
mod manager;
pub mod naming;
mod state;

use std::time::Duration;

use thiserror::Error;

pub use handle::{StageHandle, StagedTable, TableOrigin};
pub use manager::{ActiveStage, StageManager};
pub use naming::StageSchemas;
pub use state::StageState;

use crate::catalog::Ident;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("stage {stage} is {state}, cannot {operation}")]
    InvalidState {
        stage: Ident,
        state: StageState,
        operation: &'static str,
    },

    #[error("table {table} was already materialized in this run of stage {stage}")]
    DuplicateTable { stage: Ident, table: Ident },

    #[error("timed out after {timeout:?} waiting to commit stage {stage}")]
    LockTimeout { stage: Ident, timeout: Duration },

    /// Commit was asked for while materialize calls were still writing.
    #[error("stage {stage} has {} table(s) still being written", .tables.len())]
    TablesInFlight { stage: Ident, tables: Vec<Ident> },
}
