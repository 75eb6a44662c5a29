//! Hooks: code that moves one payload type in or out of the database.
//!
//! A [`HookRegistry`] is an ordered list. Resolution picks, among the hooks
//! whose predicate accepts the type, the one with the highest
//! [`TableHook::specificity`]; ties go to the hook registered first.

mod builtin;
mod error;

use std::collections::BTreeSet;
use std::fmt;

pub use builtin::{LazyQueryHook, RawSqlHook, RowSetHook};
pub use error::{Direction, HookError, HookResult, NoHookFound};

use crate::catalog::{Ident, QualifiedName};
use crate::dialect::DialectAdapter;
use crate::table::{Payload, PayloadType, Table, TableRef};

/// Representation families the built-in hooks cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookFamily {
    /// Rows held in memory, written with a bulk insert.
    TabularEager,
    /// Deferred queries, written with `CREATE TABLE .. AS`.
    TabularLazy,
    /// Hand-written SQL, written with `CREATE TABLE .. AS`.
    RawSql,
}

/// Moves one payload type between memory and a database table.
///
/// Hooks are stateless; the adapter and table arrive with each call. The
/// `can_*` predicates must be pure.
pub trait TableHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn family(&self) -> HookFamily;

    /// Higher wins when several hooks accept a type.
    fn specificity(&self) -> u32 {
        0
    }

    fn can_materialize(&self, payload_type: &PayloadType) -> bool;

    fn can_retrieve(&self, requested: &PayloadType) -> bool;

    /// Write `table` into `schema`, replacing a table of the same name. On
    /// failure no partial table is left behind.
    fn materialize(&self, adapter: &DialectAdapter, table: &Table, schema: &Ident) -> HookResult<()>;

    /// Read `table` from `schema` as the requested type.
    fn retrieve(
        &self,
        adapter: &DialectAdapter,
        table: &TableRef,
        schema: &Ident,
        requested: &PayloadType,
    ) -> HookResult<Box<dyn Payload>>;

    /// SQL the table would be computed from, for query-shaped payloads.
    fn lazy_query_str(&self, _adapter: &DialectAdapter, _table: &Table, _schema: &Ident) -> Option<String> {
        None
    }

    /// Tables the payload is computed from, with `schema` standing in for
    /// the table's own schema. `None` when they cannot be determined; such a
    /// table never gets a cache key.
    fn source_tables(&self, _table: &Table, _schema: &Ident) -> Option<BTreeSet<QualifiedName>> {
        Some(BTreeSet::new())
    }
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn TableHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in hooks for [`crate::table::RowSet`],
    /// [`crate::table::LazyQuery`] and [`crate::table::RawSql`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(RowSetHook)
            .register(LazyQueryHook)
            .register(RawSqlHook);
        registry
    }

    pub fn register(&mut self, hook: impl TableHook + 'static) -> &mut Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn hook_names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub fn resolve_for_materialize(&self, payload_type: &PayloadType) -> Result<&dyn TableHook, NoHookFound> {
        self.resolve(|h| h.can_materialize(payload_type))
            .ok_or(NoHookFound {
                payload_type: *payload_type,
                direction: Direction::Materialize,
            })
    }

    pub fn resolve_for_retrieve(&self, requested: &PayloadType) -> Result<&dyn TableHook, NoHookFound> {
        self.resolve(|h| h.can_retrieve(requested))
            .ok_or(NoHookFound {
                payload_type: *requested,
                direction: Direction::Retrieve,
            })
    }

    fn resolve<F>(&self, accepts: F) -> Option<&dyn TableHook>
    where
        F: Fn(&dyn TableHook) -> bool,
    {
        let mut best: Option<&dyn TableHook> = None;
        for hook in &self.hooks {
            let hook = hook.as_ref();
            if !accepts(hook) {
                continue;
            }
            // strictly greater keeps the earlier hook on ties
            if best.map_or(true, |b| hook.specificity() > b.specificity()) {
                best = Some(hook);
            }
        }
        best
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.hook_names()).finish()
    }
}
