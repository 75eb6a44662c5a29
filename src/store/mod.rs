//! The table store: the scheduler-facing entry point.
//!
//! A [`TableStore`] owns one hook registry and one dialect adapter. Stages
//! are run through it as
//!
//! ```no_run
//! use std::sync::Arc;
//! use matstore::{LocalConnection, RowSet, StoreConfig, Table, TableRef, TableStore};
//!
//! let store = TableStore::new(StoreConfig::default(), Arc::new(LocalConnection::temporary().unwrap()));
//! let stage = store.begin_stage("load").unwrap();
//! store.materialize(&stage, Table::new("load", "customers", RowSet::default()).unwrap()).unwrap();
//! store.commit_stage(&stage).unwrap();
//!
//! let customers: RowSet = store.retrieve_as(&TableRef::new("load", "customers").unwrap()).unwrap();
//! ```

mod error;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

pub use error::{RetrievalCause, StoreError, StoreResult};

use crate::cache::{metadata, CacheKey, CacheKeyFn, CacheKeyInput, DefaultCacheKey, TableMetadata};
use crate::catalog::{Ident, QualifiedName};
use crate::config::StoreConfig;
use crate::dialect::DialectAdapter;
use crate::driver::Connection;
use crate::hooks::{HookRegistry, TableHook};
use crate::sql::Query;
use crate::stage::naming::is_working_schema;
use crate::stage::{StageHandle, StageManager, StageState, StagedTable, TableOrigin};
use crate::table::{LazyQuery, Payload, PayloadType, RowSet, Table, TableRef};

/// What a materialize call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// A hook wrote the table into the working schema.
    Materialized,
    /// The published table has the same cache key; nothing was written.
    CacheHit,
}

impl MaterializeOutcome {
    pub fn is_cache_hit(&self) -> bool {
        matches!(self, MaterializeOutcome::CacheHit)
    }
}

/// Persists pipeline tables and publishes them one stage at a time.
///
/// Thread-safe: share it via `Arc`. Materialize calls for distinct tables of
/// one stage may run concurrently; commits of the same stage serialize.
pub struct TableStore {
    config: StoreConfig,
    registry: HookRegistry,
    adapter: DialectAdapter,
    stages: StageManager,
    cache_key_fn: Box<dyn CacheKeyFn>,
}

impl TableStore {
    /// A store with the built-in hooks and [`DefaultCacheKey`].
    pub fn new(config: StoreConfig, connection: Arc<dyn Connection>) -> Self {
        let adapter = DialectAdapter::new(config.dialect, connection).with_options(config.exec_options());
        Self {
            config,
            registry: HookRegistry::with_defaults(),
            adapter,
            stages: StageManager::new(),
            cache_key_fn: Box::new(DefaultCacheKey),
        }
    }

    pub fn with_registry(mut self, registry: HookRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cache_key_fn(mut self, cache_key_fn: impl CacheKeyFn + 'static) -> Self {
        self.cache_key_fn = Box::new(cache_key_fn);
        self
    }

    pub fn register_hook(&mut self, hook: impl TableHook + 'static) -> &mut Self {
        self.registry.register(hook);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    pub fn adapter(&self) -> &DialectAdapter {
        &self.adapter
    }

    pub fn stages(&self) -> &StageManager {
        &self.stages
    }

    // ==================== Stages ====================

    /// Start a run of `stage` in a fresh working schema.
    pub fn begin_stage(&self, stage: &str) -> StoreResult<StageHandle> {
        let stage = Ident::new(stage)?;
        let mut handle = self.stages.register(&stage)?;

        if let Err(source) = self.adapter.create_schema(handle.working_schema()) {
            handle.fail();
            return Err(StoreError::DialectExecution { stage, source });
        }

        if self.config.cache_mode.is_enabled() {
            let published = match self.read_metadata(&stage) {
                Ok(records) => metadata::index(records),
                Err(e) => {
                    warn!(%stage, error = %e, "cannot read published metadata, no cache hits this run");
                    HashMap::new()
                }
            };
            handle.set_published_metadata(published);
        }

        handle.transition(StageState::Materializing, "begin")?;
        info!(%stage, working = %handle.working_schema(), "stage started");
        Ok(handle)
    }

    /// Publish everything the stage wrote. On failure the stage is `Failed`
    /// and the published schema keeps its previous tables.
    ///
    /// While materialize calls of the stage are still writing this returns
    /// [`StoreError::TablesInFlight`] and the stage stays `Materializing`.
    pub fn commit_stage(&self, handle: &StageHandle) -> StoreResult<()> {
        handle.begin_commit()?;

        let result = match self
            .stages
            .with_commit_lock(handle.stage(), self.config.lock_timeout, || self.publish(handle))
        {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                handle.transition(StageState::Committed, "commit")?;
                info!(stage = %handle.stage(), tables = handle.staged_count(), "stage committed");
                Ok(())
            }
            Err(e) => {
                handle.fail();
                warn!(stage = %handle.stage(), error = %e, "stage commit failed");
                Err(e)
            }
        }
    }

    /// Discard the run. The working schema is dropped unless
    /// `keep_failed_working_schema` is set.
    pub fn rollback_stage(&self, handle: &StageHandle) -> StoreResult<()> {
        handle.transition(StageState::RolledBack, "roll back")?;
        let working = handle.working_schema();

        if self.config.keep_failed_working_schema {
            info!(stage = %handle.stage(), %working, "stage rolled back, working schema kept");
            return Ok(());
        }
        self.adapter
            .drop_schema(working)
            .map_err(|source| StoreError::DialectExecution {
                stage: handle.stage().clone(),
                source,
            })?;
        info!(stage = %handle.stage(), "stage rolled back");
        Ok(())
    }

    /// Runs with the commit lock held.
    fn publish(&self, handle: &StageHandle) -> StoreResult<()> {
        let stage = handle.stage();
        let schemas = handle.schemas();
        let staged = handle.staged_tables();
        let commit_err = |source| StoreError::Commit {
            stage: stage.clone(),
            source,
        };

        // the published schema may have changed since begin
        let hits: Vec<&StagedTable> = staged.iter().filter(|t| t.origin == TableOrigin::CacheHit).collect();
        let current = if hits.is_empty() {
            HashMap::new()
        } else {
            metadata::index(self.read_metadata(&schemas.published)?)
        };

        for table in &hits {
            let published_key = current.get(&table.name).and_then(|m| m.cache_key.as_ref());
            if published_key != table.cache_key.as_ref() {
                return Err(StoreError::StaleCacheHit {
                    stage: stage.clone(),
                    table: table.name.clone(),
                });
            }
            self.adapter
                .copy_table(
                    &QualifiedName::new(schemas.published.clone(), table.name.clone()),
                    &QualifiedName::new(schemas.working.clone(), table.name.clone()),
                )
                .map_err(commit_err)?;
            debug!(%stage, table = %table.name, "carried over cached table");
        }

        let now = Utc::now();
        let records: Vec<TableMetadata> = staged
            .iter()
            .map(|table| match (table.origin, current.get(&table.name)) {
                (TableOrigin::CacheHit, Some(previous)) => previous.clone(),
                _ => TableMetadata {
                    table_name: table.name.clone(),
                    cache_key: table.cache_key.clone(),
                    version: table.version.clone(),
                    run_id: handle.run_label(),
                    materialized_at: now,
                },
            })
            .collect();

        let meta_table = metadata::metadata_table(&schemas.working);
        self.adapter
            .create_table(&meta_table, &metadata::columns())
            .map_err(commit_err)?;
        self.adapter
            .bulk_insert(&meta_table, &metadata::to_rowset(&records))
            .map_err(commit_err)?;

        self.adapter
            .swap_schemas(&schemas.working, &schemas.published, &schemas.backup)
            .map_err(commit_err)?;

        if !self.config.retain_previous {
            // the new tables are already visible
            if let Err(e) = self.adapter.drop_schema(&schemas.backup) {
                warn!(%stage, backup = %schemas.backup, error = %e, "could not drop previous schema");
            }
        }
        Ok(())
    }

    // ==================== Tables ====================

    /// Write `table` into the working schema of `handle`, or record a cache
    /// hit. Any failure marks the stage `Failed`.
    pub fn materialize(&self, handle: &StageHandle, table: Table) -> StoreResult<MaterializeOutcome> {
        if table.stage() != handle.stage() {
            return Err(StoreError::StageMismatch {
                expected: handle.stage().clone(),
                found: table.stage().clone(),
            });
        }
        handle.reserve(table.name())?;

        let result = self.materialize_reserved(handle, &table);
        if result.is_err() {
            handle.fail();
        }
        result
    }

    fn materialize_reserved(&self, handle: &StageHandle, table: &Table) -> StoreResult<MaterializeOutcome> {
        let hook = self.registry.resolve_for_materialize(&table.payload_type())?;
        let cache_key = self.cache_key(hook, handle, table);

        let staged = |origin| StagedTable {
            name: table.name().clone(),
            cache_key: cache_key.clone(),
            version: table.version().map(str::to_string),
            origin,
        };

        if self.config.cache_mode.is_enabled() && cache_key.is_some() {
            let published = handle.published_metadata(table.name()).and_then(|m| m.cache_key.as_ref());
            if published == cache_key.as_ref() {
                debug!(stage = %handle.stage(), table = %table.name(), "cache hit");
                handle.record(staged(TableOrigin::CacheHit));
                return Ok(MaterializeOutcome::CacheHit);
            }
        }

        hook.materialize(&self.adapter, table, handle.working_schema())
            .map_err(|source| StoreError::Materialization {
                stage: handle.stage().clone(),
                table: table.name().clone(),
                dialect: self.adapter.kind(),
                source,
            })?;
        debug!(stage = %handle.stage(), table = %table.name(), hook = hook.name(), "materialized");
        handle.record(staged(TableOrigin::Materialized));
        Ok(MaterializeOutcome::Materialized)
    }

    fn cache_key(&self, hook: &dyn TableHook, handle: &StageHandle, table: &Table) -> Option<CacheKey> {
        // query text is taken against the published schema so it is the same every run
        let fingerprint = table
            .payload()
            .content_fingerprint()
            .or_else(|| hook.lazy_query_str(&self.adapter, table, handle.published_schema()));
        let fresh_input = if self.config.ignore_fresh_input {
            None
        } else {
            table.fresh_input()
        };
        let upstream = self.upstream_keys(hook, handle, table)?;

        self.cache_key_fn.cache_key(&CacheKeyInput {
            stage: handle.stage(),
            table: table.name(),
            version: table.version(),
            fingerprint: fingerprint.as_deref(),
            fresh_input,
            upstream: (!upstream.is_empty()).then_some(upstream.as_str()),
        })
    }

    /// One `schema.table=key` line per table the payload reads. `None` when
    /// any of them has no known key.
    ///
    /// Sources in other stages take the key their published metadata holds;
    /// sources in this stage must already be recorded in this run.
    fn upstream_keys(&self, hook: &dyn TableHook, handle: &StageHandle, table: &Table) -> Option<String> {
        let sources = hook.source_tables(table, handle.published_schema())?;
        let mut published: HashMap<Ident, HashMap<Ident, TableMetadata>> = HashMap::new();
        let mut lines = Vec::with_capacity(sources.len());

        for source in &sources {
            let key = if &source.schema == handle.published_schema() {
                handle.staged_key(&source.name)
            } else {
                let records = match published.entry(source.schema.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let records = self
                            .read_metadata(&source.schema)
                            .inspect_err(|e| debug!(%source, error = %e, "cannot read source metadata"))
                            .ok()?;
                        entry.insert(metadata::index(records))
                    }
                };
                records.get(&source.name).and_then(|m| m.cache_key.clone())
            };

            match key {
                Some(key) => lines.push(format!("{source}={key}")),
                None => {
                    debug!(table = %table.name(), %source, "source has no cache key, table is not cacheable");
                    return None;
                }
            }
        }
        Some(lines.join("\n"))
    }

    /// Read a published table as `requested`. Tables of runs that have not
    /// committed are never visible here, not even by naming a working schema.
    pub fn retrieve(&self, table: &TableRef, requested: PayloadType) -> StoreResult<Box<dyn Payload>> {
        let hook = self
            .registry
            .resolve_for_retrieve(&requested)
            .map_err(|e| StoreError::Retrieval {
                table: table.clone(),
                source: e.into(),
            })?;
        if is_working_schema(table.stage.as_str()) {
            return Err(StoreError::TableNotFound { table: table.clone() });
        }

        let published = &table.stage;
        let tables = self
            .adapter
            .introspect_schema(published)
            .map_err(|source| StoreError::DialectExecution {
                stage: table.stage.clone(),
                source,
            })?;
        if table.name.is_reserved() || !tables.contains(table.name.as_str()) {
            return Err(StoreError::TableNotFound { table: table.clone() });
        }

        hook.retrieve(&self.adapter, table, published, &requested)
            .map_err(|e| StoreError::Retrieval {
                table: table.clone(),
                source: e.into(),
            })
    }

    pub fn retrieve_as<T: Payload>(&self, table: &TableRef) -> StoreResult<T> {
        let payload = self.retrieve(table, PayloadType::of::<T>())?;
        let found = payload.payload_type();
        payload
            .into_any()
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| StoreError::PayloadMismatch {
                expected: std::any::type_name::<T>(),
                found,
            })
    }

    /// Evaluate a lazy query.
    pub fn collect(&self, query: &LazyQuery) -> StoreResult<RowSet> {
        Ok(self.adapter.query(query.query())?)
    }

    // ==================== Introspection ====================

    /// The published schema of `stage`, if the stage has ever committed.
    pub fn published_schema(&self, stage: &str) -> StoreResult<Option<Ident>> {
        let stage = Ident::new(stage)?;
        if is_working_schema(stage.as_str()) {
            return Ok(None);
        }
        let exists = self
            .adapter
            .schema_exists(&stage)
            .map_err(|source| StoreError::DialectExecution {
                stage: stage.clone(),
                source,
            })?;
        Ok(exists.then_some(stage))
    }

    /// Published tables of `stage`, sorted.
    pub fn list_tables(&self, stage: &str) -> StoreResult<Vec<Ident>> {
        let stage = Ident::new(stage)?;
        if is_working_schema(stage.as_str()) {
            return Ok(Vec::new());
        }
        let names = self
            .adapter
            .introspect_schema(&stage)
            .map_err(|source| StoreError::DialectExecution {
                stage: stage.clone(),
                source,
            })?;
        Ok(names
            .into_iter()
            .filter_map(|name| Ident::new(name).ok())
            .filter(|name| !name.is_reserved())
            .collect())
    }

    /// Metadata records of the published tables of `stage`.
    pub fn table_metadata(&self, stage: &str) -> StoreResult<Vec<TableMetadata>> {
        let stage = Ident::new(stage)?;
        if is_working_schema(stage.as_str()) {
            return Ok(Vec::new());
        }
        self.read_metadata(&stage)
    }

    fn read_metadata(&self, schema: &Ident) -> StoreResult<Vec<TableMetadata>> {
        let dialect_err = |source| StoreError::DialectExecution {
            stage: schema.clone(),
            source,
        };
        let tables = self.adapter.introspect_schema(schema).map_err(dialect_err)?;
        if !tables.contains(metadata::METADATA_TABLE) {
            return Ok(Vec::new());
        }

        let rows = self
            .adapter
            .query(&Query::scan(metadata::metadata_table(schema)))
            .map_err(dialect_err)?;
        metadata::from_rowset(&rows).map_err(|source| StoreError::Metadata {
            stage: schema.clone(),
            source,
        })
    }

    /// Drop working schemas left behind by runs that are no longer live.
    /// Returns how many were dropped.
    ///
    /// Only runs started through this store count as live; call it when no
    /// other process is running stages against the same database.
    pub fn cleanup_abandoned(&self) -> StoreResult<usize> {
        let schemas = self.adapter.list_schemas()?;
        let abandoned = self
            .stages
            .abandoned_working_schemas(schemas.iter().map(String::as_str));

        let mut cleaned = 0;
        for schema in abandoned {
            match self.adapter.drop_schema(&schema) {
                Ok(()) => {
                    debug!(%schema, "dropped abandoned working schema");
                    cleaned += 1;
                }
                Err(e) => warn!(%schema, error = %e, "could not drop abandoned working schema"),
            }
        }
        Ok(cleaned)
    }
}

impl fmt::Debug for TableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStore")
            .field("dialect", &self.adapter.kind())
            .field("hooks", &self.registry)
            .field("cache_key_fn", &self.cache_key_fn.name())
            .field("active_stages", &self.stages.active_count())
            .finish()
    }
}
