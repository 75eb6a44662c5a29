//! One database's capability surface: a dialect plus a connection.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::render::{render_query, render_statement};
use super::{DialectExecutionError, DialectKind, DialectResult, SqlDialect, SwapStrategy};
use crate::catalog::{ColumnDef, Ident, QualifiedName};
use crate::driver::{Connection, DriverError, ExecOptions, RenderedQuery, RenderedStatement};
use crate::sql::{Query, Statement};
use crate::table::{LazyQuery, RowSet};

/// Renders typed statements for one dialect and sends them over one
/// connection. Every failure comes back as a [`DialectExecutionError`]
/// naming the dialect and the statement; nothing is retried.
pub struct DialectAdapter {
    dialect: Box<dyn SqlDialect>,
    connection: Arc<dyn Connection>,
    options: ExecOptions,
}

impl DialectAdapter {
    pub fn new(kind: DialectKind, connection: Arc<dyn Connection>) -> Self {
        Self::with_dialect(kind.dialect(), connection)
    }

    pub fn with_dialect(dialect: Box<dyn SqlDialect>, connection: Arc<dyn Connection>) -> Self {
        Self {
            dialect,
            connection,
            options: ExecOptions::default(),
        }
    }

    /// Options sent with every call.
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn kind(&self) -> DialectKind {
        self.dialect.kind()
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn options(&self) -> ExecOptions {
        self.options
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    pub fn qualified(&self, name: &QualifiedName) -> String {
        self.dialect.qualified(name)
    }

    fn error(&self, statement: impl Into<String>, source: DriverError) -> DialectExecutionError {
        DialectExecutionError {
            dialect: self.kind(),
            statement: statement.into(),
            source,
        }
    }

    // ==================== Statements ====================

    pub fn execute(&self, statement: Statement) -> DialectResult<()> {
        let sql = render_statement(self.dialect(), &statement).map_err(|e| self.error(statement.kind(), e))?;
        debug!(dialect = %self.kind(), kind = statement.kind(), %sql, "execute");

        let rendered = RenderedStatement { sql, statement };
        self.connection
            .execute(&rendered, &self.options)
            .map_err(|e| self.error(rendered.sql, e))
    }

    /// Run SQL text as written.
    pub fn execute_sql(&self, sql: impl Into<String>) -> DialectResult<()> {
        self.execute(Statement::Raw(sql.into()))
    }

    pub fn query(&self, query: &Query) -> DialectResult<RowSet> {
        let rendered = RenderedQuery {
            sql: render_query(self.dialect(), query),
            query: query.clone(),
        };
        trace!(dialect = %self.kind(), sql = %rendered.sql, "query");
        self.connection
            .query(&rendered, &self.options)
            .map_err(|e| self.error(rendered.sql, e))
    }

    /// SQL text of a lazy query in this dialect.
    pub fn compile_lazy_query(&self, lazy: &LazyQuery) -> String {
        render_query(self.dialect(), lazy.query())
    }

    pub fn bulk_insert(&self, table: &QualifiedName, rows: &RowSet) -> DialectResult<u64> {
        self.connection
            .bulk_insert(table, rows, &self.options)
            .map_err(|e| self.error(self.insert_template(table, rows.columns()), e))
    }

    fn insert_template(&self, table: &QualifiedName, columns: &[ColumnDef]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote_ident(&c.name)).collect();
        let params = vec!["?"; columns.len()];
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified(table),
            names.join(", "),
            params.join(", ")
        )
    }

    pub fn introspect_schema(&self, schema: &Ident) -> DialectResult<BTreeSet<String>> {
        self.connection
            .introspect_schema(schema, &self.options)
            .map_err(|e| self.error(self.dialect.list_tables_sql(schema), e))
    }

    pub fn schema_exists(&self, schema: &Ident) -> DialectResult<bool> {
        self.connection
            .schema_exists(schema, &self.options)
            .map_err(|e| self.error(self.dialect.schema_exists_sql(schema), e))
    }

    pub fn list_schemas(&self) -> DialectResult<BTreeSet<String>> {
        self.connection
            .list_schemas(&self.options)
            .map_err(|e| self.error(self.dialect.list_schemas_sql(), e))
    }

    /// Tables of `schema` as identifiers.
    fn table_names(&self, schema: &Ident) -> DialectResult<Vec<Ident>> {
        self.introspect_schema(schema)?
            .into_iter()
            .map(|name| {
                Ident::new(name.as_str()).map_err(|e| {
                    self.error(
                        self.dialect.list_tables_sql(schema),
                        DriverError::Other(format!("table '{}' in {}: {}", name, schema, e)),
                    )
                })
            })
            .collect()
    }

    // ==================== Schemas ====================

    pub fn create_schema(&self, schema: &Ident) -> DialectResult<()> {
        self.execute(Statement::create_schema(schema))
    }

    pub fn create_schema_if_not_exists(&self, schema: &Ident) -> DialectResult<()> {
        self.execute(Statement::CreateSchema {
            name: schema.clone(),
            if_not_exists: true,
        })
    }

    /// Drop a schema and everything in it. Missing schemas are ignored.
    /// Dialects without `CASCADE` drop the tables one by one first.
    pub fn drop_schema(&self, schema: &Ident) -> DialectResult<()> {
        if self.dialect.supports_drop_cascade() {
            return self.execute(Statement::drop_schema(schema, true, true));
        }
        if !self.schema_exists(schema)? {
            return Ok(());
        }
        for table in self.table_names(schema)? {
            self.drop_table(&QualifiedName::new(schema.clone(), table))?;
        }
        self.execute(Statement::drop_schema(schema, true, false))
    }

    /// Fails with [`DriverError::Unsupported`] on dialects that cannot
    /// rename schemas.
    pub fn rename_schema(&self, from: &Ident, to: &Ident) -> DialectResult<()> {
        self.execute(Statement::RenameSchema {
            from: from.clone(),
            to: to.clone(),
        })
    }

    // ==================== Tables ====================

    pub fn create_table(&self, table: &QualifiedName, columns: &[ColumnDef]) -> DialectResult<()> {
        self.execute(Statement::CreateTable {
            name: table.clone(),
            columns: columns.to_vec(),
        })
    }

    pub fn create_table_as(&self, table: &QualifiedName, query: Query) -> DialectResult<()> {
        self.execute(Statement::CreateTableAs {
            name: table.clone(),
            query,
        })
    }

    /// Drop if exists.
    pub fn drop_table(&self, table: &QualifiedName) -> DialectResult<()> {
        self.execute(Statement::drop_table(table, true))
    }

    pub fn copy_table(&self, source: &QualifiedName, target: &QualifiedName) -> DialectResult<()> {
        self.execute(Statement::CopyTable {
            source: source.clone(),
            target: target.clone(),
        })
    }

    pub fn transfer_table(&self, source: &QualifiedName, target_schema: &Ident) -> DialectResult<()> {
        self.execute(Statement::TransferTable {
            source: source.clone(),
            target_schema: target_schema.clone(),
        })
    }

    // ==================== Schema swap ====================

    /// Make `working` the new `published` schema. The old published tables
    /// end up in `backup`, which is replaced if it already exists; `working`
    /// is gone afterwards.
    ///
    /// With a non-atomic strategy a failure in the second phase moves the
    /// tables back where they came from, as far as the database allows.
    pub fn swap_schemas(&self, working: &Ident, published: &Ident, backup: &Ident) -> DialectResult<()> {
        let strategy = self.dialect.swap_strategy();
        debug!(dialect = %self.kind(), %working, %published, ?strategy, "swapping schemas");

        self.drop_schema(backup)?;
        match strategy {
            SwapStrategy::AtomicRename => {
                let mut statements = Vec::with_capacity(2);
                if self.schema_exists(published)? {
                    statements.push(Statement::RenameSchema {
                        from: published.clone(),
                        to: backup.clone(),
                    });
                }
                statements.push(Statement::RenameSchema {
                    from: working.clone(),
                    to: published.clone(),
                });
                self.execute(Statement::Batch {
                    statements,
                    transactional: true,
                })
            }
            SwapStrategy::TransactionalCopy => {
                let statements = self.swap_statements(working, published, backup)?;
                self.execute(Statement::Batch {
                    statements,
                    transactional: true,
                })
            }
            SwapStrategy::TransferTables | SwapStrategy::CopyAndDrop => {
                self.swap_in_phases(working, published, backup)
            }
        }
    }

    fn swap_statements(&self, working: &Ident, published: &Ident, backup: &Ident) -> DialectResult<Vec<Statement>> {
        let old = self.table_names(published)?;
        let new = self.table_names(working)?;

        let mut statements = Vec::with_capacity(old.len() + new.len() + 3);
        statements.push(Statement::create_schema(backup));
        statements.extend(old.into_iter().map(|t| Statement::TransferTable {
            source: QualifiedName::new(published.clone(), t),
            target_schema: backup.clone(),
        }));
        statements.push(Statement::CreateSchema {
            name: published.clone(),
            if_not_exists: true,
        });
        statements.extend(new.into_iter().map(|t| Statement::TransferTable {
            source: QualifiedName::new(working.clone(), t),
            target_schema: published.clone(),
        }));
        statements.push(Statement::drop_schema(working, false, false));
        Ok(statements)
    }

    fn swap_in_phases(&self, working: &Ident, published: &Ident, backup: &Ident) -> DialectResult<()> {
        let old = self.table_names(published)?;
        let new = self.table_names(working)?;
        self.create_schema(backup)?;

        // phase 1: published -> backup
        let mut moved_out = Vec::with_capacity(old.len());
        if let Err(e) = self.move_tables(&old, published, backup, &mut moved_out) {
            self.move_back(&moved_out, backup, published);
            return Err(e);
        }

        // readers see an empty or partial published schema until phase 2 ends
        let mut moved_in = Vec::with_capacity(new.len());
        let phase2 = self
            .create_schema_if_not_exists(published)
            .and_then(|_| self.move_tables(&new, working, published, &mut moved_in));
        if let Err(e) = phase2 {
            warn!(dialect = %self.kind(), %published, error = %e, "schema swap failed in phase 2, compensating");
            self.move_back(&moved_in, published, working);
            self.move_back(&moved_out, backup, published);
            return Err(e);
        }

        self.drop_schema(working)
    }

    fn move_tables(&self, tables: &[Ident], from: &Ident, to: &Ident, moved: &mut Vec<Ident>) -> DialectResult<()> {
        for table in tables {
            self.transfer_table(&QualifiedName::new(from.clone(), table.clone()), to)?;
            moved.push(table.clone());
        }
        Ok(())
    }

    fn move_back(&self, tables: &[Ident], from: &Ident, to: &Ident) {
        for table in tables {
            let source = QualifiedName::new(from.clone(), table.clone());
            if let Err(e) = self.transfer_table(&source, to) {
                warn!(dialect = %self.kind(), table = %source, error = %e, "could not move table back");
            }
        }
    }
}

impl fmt::Debug for DialectAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectAdapter")
            .field("dialect", &self.kind())
            .field("options", &self.options)
            .finish()
    }
}
