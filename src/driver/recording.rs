//! A connection wrapper that keeps an audit log of every call.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Connection, DriverResult, ExecOptions, RenderedQuery, RenderedStatement};
use crate::catalog::{Ident, QualifiedName};
use crate::table::RowSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Execute,
    Query,
    BulkInsert,
    Introspect,
    SchemaExists,
}

impl CallKind {
    /// Calls that can change database state.
    pub fn is_write(&self) -> bool {
        matches!(self, CallKind::Execute | CallKind::BulkInsert)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    /// rendered SQL, or a description for calls without SQL
    pub sql: String,
}

/// Forwards to another connection and records what was sent.
pub struct RecordingConnection {
    inner: Arc<dyn Connection>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingConnection {
    pub fn new(inner: Arc<dyn Connection>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, kind: CallKind, sql: String) {
        self.calls.lock().push(RecordedCall { kind, sql });
    }

    pub fn entries(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.kind.is_write())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl fmt::Debug for RecordingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingConnection")
            .field("calls", &self.calls.lock().len())
            .finish()
    }
}

impl Connection for RecordingConnection {
    fn execute(&self, statement: &RenderedStatement, options: &ExecOptions) -> DriverResult<()> {
        self.record(CallKind::Execute, statement.sql.clone());
        self.inner.execute(statement, options)
    }

    fn query(&self, query: &RenderedQuery, options: &ExecOptions) -> DriverResult<RowSet> {
        self.record(CallKind::Query, query.sql.clone());
        self.inner.query(query, options)
    }

    fn bulk_insert(&self, table: &QualifiedName, rows: &RowSet, options: &ExecOptions) -> DriverResult<u64> {
        self.record(
            CallKind::BulkInsert,
            format!("bulk insert into {} ({} rows)", table, rows.len()),
        );
        self.inner.bulk_insert(table, rows, options)
    }

    fn introspect_schema(&self, schema: &Ident, options: &ExecOptions) -> DriverResult<BTreeSet<String>> {
        self.record(CallKind::Introspect, format!("list tables in {}", schema));
        self.inner.introspect_schema(schema, options)
    }

    fn schema_exists(&self, schema: &Ident, options: &ExecOptions) -> DriverResult<bool> {
        self.record(CallKind::SchemaExists, format!("schema exists {}", schema));
        self.inner.schema_exists(schema, options)
    }

    fn list_schemas(&self, options: &ExecOptions) -> DriverResult<BTreeSet<String>> {
        self.record(CallKind::Introspect, "list schemas".to_string());
        self.inner.list_schemas(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LocalConnection;
    use crate::sql::Statement;

    #[test]
    fn test_records_and_forwards() {
        let local = Arc::new(LocalConnection::temporary().unwrap());
        let recording = RecordingConnection::new(local.clone());
        let opts = ExecOptions::default();
        let load = Ident::new("load").unwrap();

        recording
            .execute(
                &RenderedStatement {
                    sql: "CREATE SCHEMA \"load\"".into(),
                    statement: Statement::create_schema(&load),
                },
                &opts,
            )
            .unwrap();
        assert!(recording.schema_exists(&load, &opts).unwrap());
        assert!(local.schema_exists(&load, &opts).unwrap());

        assert_eq!(recording.entries().len(), 2);
        assert_eq!(
            recording.writes(),
            vec![RecordedCall {
                kind: CallKind::Execute,
                sql: "CREATE SCHEMA \"load\"".into()
            }]
        );

        recording.clear();
        assert!(recording.entries().is_empty());
    }
}
