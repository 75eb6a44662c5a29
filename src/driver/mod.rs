//! The seam between dialects and databases.
//!
//! A dialect renders typed statements to SQL text; a [`Connection`] receives
//! both the text and the typed value. Drivers for remote databases send the
//! text. [`LocalConnection`] executes the typed value against the git-backed
//! engine in [`crate::storage`].

mod error;
mod local;
mod recording;

use std::collections::BTreeSet;
use std::time::Duration;

pub use error::{DriverError, DriverResult};
pub use local::LocalConnection;
pub use recording::{CallKind, RecordedCall, RecordingConnection};

use crate::catalog::{Ident, QualifiedName};
use crate::sql::{Query, Statement};
use crate::table::RowSet;

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// A statement together with the SQL a dialect rendered for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStatement {
    pub sql: String,
    pub statement: Statement,
}

/// A query together with its rendered SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub query: Query,
}

/// A live connection to one database.
///
/// Calls may come from several threads at once; implementations serialize
/// internally where the database requires it.
pub trait Connection: Send + Sync {
    fn execute(&self, statement: &RenderedStatement, options: &ExecOptions) -> DriverResult<()>;

    fn query(&self, query: &RenderedQuery, options: &ExecOptions) -> DriverResult<RowSet>;

    /// Append rows to an existing table. Rows are in the table's column
    /// order. Returns the number of rows written.
    fn bulk_insert(&self, table: &QualifiedName, rows: &RowSet, options: &ExecOptions) -> DriverResult<u64>;

    /// Table names in `schema`; empty when the schema does not exist.
    fn introspect_schema(&self, schema: &Ident, options: &ExecOptions) -> DriverResult<BTreeSet<String>>;

    fn schema_exists(&self, schema: &Ident, options: &ExecOptions) -> DriverResult<bool>;

    /// Every schema name in the database.
    fn list_schemas(&self, _options: &ExecOptions) -> DriverResult<BTreeSet<String>> {
        Err(DriverError::Unsupported("listing schemas".into()))
    }
}
