//! Hooks for the payload types this crate ships.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::{HookError, HookFamily, HookResult, TableHook};
use crate::catalog::{Ident, QualifiedName};
use crate::dialect::DialectAdapter;
use crate::sql::{Parser, Query};
use crate::table::{LazyQuery, Payload, PayloadType, RawSql, RowSet, Table, TableRef};

fn target(table: &Table, schema: &Ident) -> QualifiedName {
    QualifiedName::new(schema.clone(), table.name().clone())
}

fn payload<T: Payload>(table: &Table) -> HookResult<&T> {
    table
        .payload()
        .downcast_ref::<T>()
        .ok_or_else(|| HookError::mismatch::<T>(table.payload_type()))
}

/// [`RowSet`]: create the table, then bulk insert.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowSetHook;

impl TableHook for RowSetHook {
    fn name(&self) -> &'static str {
        "rowset"
    }

    fn family(&self) -> HookFamily {
        HookFamily::TabularEager
    }

    fn can_materialize(&self, payload_type: &PayloadType) -> bool {
        payload_type.is::<RowSet>()
    }

    fn can_retrieve(&self, requested: &PayloadType) -> bool {
        requested.is::<RowSet>()
    }

    fn materialize(&self, adapter: &DialectAdapter, table: &Table, schema: &Ident) -> HookResult<()> {
        let rows = payload::<RowSet>(table)?;
        rows.validate()?;
        let target = target(table, schema);

        adapter.drop_table(&target)?;
        adapter.create_table(&target, rows.columns())?;
        if let Err(e) = adapter.bulk_insert(&target, rows) {
            if let Err(drop_err) = adapter.drop_table(&target) {
                warn!(table = %target, error = %drop_err, "could not drop partially written table");
            }
            return Err(e.into());
        }
        debug!(table = %target, rows = rows.len(), "materialized rows");
        Ok(())
    }

    fn retrieve(
        &self,
        adapter: &DialectAdapter,
        table: &TableRef,
        schema: &Ident,
        _requested: &PayloadType,
    ) -> HookResult<Box<dyn Payload>> {
        let rows = adapter.query(&Query::scan(table.in_schema(schema)))?;
        Ok(Box::new(rows))
    }
}

/// [`LazyQuery`]: `CREATE TABLE .. AS` the compiled query. Retrieval reads
/// nothing and returns a scan of the table.
#[derive(Debug, Clone, Copy, Default)]
pub struct LazyQueryHook;

impl TableHook for LazyQueryHook {
    fn name(&self) -> &'static str {
        "lazy_query"
    }

    fn family(&self) -> HookFamily {
        HookFamily::TabularLazy
    }

    fn can_materialize(&self, payload_type: &PayloadType) -> bool {
        payload_type.is::<LazyQuery>()
    }

    fn can_retrieve(&self, requested: &PayloadType) -> bool {
        requested.is::<LazyQuery>()
    }

    fn materialize(&self, adapter: &DialectAdapter, table: &Table, schema: &Ident) -> HookResult<()> {
        let lazy = payload::<LazyQuery>(table)?;
        let target = target(table, schema);
        adapter.drop_table(&target)?;
        adapter.create_table_as(&target, lazy.query().clone())?;
        Ok(())
    }

    fn retrieve(
        &self,
        _adapter: &DialectAdapter,
        table: &TableRef,
        schema: &Ident,
        _requested: &PayloadType,
    ) -> HookResult<Box<dyn Payload>> {
        Ok(Box::new(LazyQuery::scan(table.in_schema(schema))))
    }

    fn lazy_query_str(&self, adapter: &DialectAdapter, table: &Table, _schema: &Ident) -> Option<String> {
        let lazy = table.payload().downcast_ref::<LazyQuery>()?;
        Some(adapter.compile_lazy_query(lazy))
    }

    fn source_tables(&self, table: &Table, _schema: &Ident) -> Option<BTreeSet<QualifiedName>> {
        let lazy = table.payload().downcast_ref::<LazyQuery>()?;
        lazy.query()
            .source_tables()
            .inspect_err(|e| debug!(table = %table.name(), error = %e, "cannot determine query sources"))
            .ok()
    }
}

/// [`RawSql`]: bind placeholders, then `CREATE TABLE .. AS` the result.
///
/// Besides the payload's own bindings, `{{target_schema}}` (the schema being
/// written) and `{{stage}}` are available.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSqlHook;

impl RawSqlHook {
    fn bindings(table: &Table, schema: &Ident) -> BTreeMap<String, String> {
        let mut bindings = BTreeMap::new();
        bindings.insert("target_schema".to_string(), schema.to_string());
        bindings.insert("stage".to_string(), table.stage().to_string());
        bindings
    }
}

impl TableHook for RawSqlHook {
    fn name(&self) -> &'static str {
        "raw_sql"
    }

    fn family(&self) -> HookFamily {
        HookFamily::RawSql
    }

    fn can_materialize(&self, payload_type: &PayloadType) -> bool {
        payload_type.is::<RawSql>()
    }

    fn can_retrieve(&self, requested: &PayloadType) -> bool {
        requested.is::<RawSql>()
    }

    fn materialize(&self, adapter: &DialectAdapter, table: &Table, schema: &Ident) -> HookResult<()> {
        let raw = payload::<RawSql>(table)?;
        let sql = raw.render(&Self::bindings(table, schema))?;
        let target = target(table, schema);
        adapter.drop_table(&target)?;
        adapter.create_table_as(&target, Query::sql(sql))?;
        Ok(())
    }

    fn retrieve(
        &self,
        adapter: &DialectAdapter,
        table: &TableRef,
        schema: &Ident,
        _requested: &PayloadType,
    ) -> HookResult<Box<dyn Payload>> {
        let select = format!("SELECT * FROM {}", adapter.qualified(&table.in_schema(schema)));
        Ok(Box::new(RawSql::new(select)))
    }

    fn lazy_query_str(&self, _adapter: &DialectAdapter, table: &Table, schema: &Ident) -> Option<String> {
        let raw = table.payload().downcast_ref::<RawSql>()?;
        raw.render(&Self::bindings(table, schema)).ok()
    }

    fn source_tables(&self, table: &Table, schema: &Ident) -> Option<BTreeSet<QualifiedName>> {
        let raw = table.payload().downcast_ref::<RawSql>()?;
        let sql = raw.render(&Self::bindings(table, schema)).ok()?;
        Parser::source_tables(&sql)
            .inspect_err(|e| debug!(table = %table.name(), error = %e, "cannot determine sql sources"))
            .ok()
    }
}
