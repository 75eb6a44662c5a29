//! The caller's token for one running stage.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;
use ulid::Ulid;

use super::{StageError, StageManager, StageSchemas, StageState};
use crate::cache::{CacheKey, TableMetadata};
use crate::catalog::Ident;

/// How a table got into the working schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrigin {
    /// Written by a hook in this run.
    Materialized,
    /// Unchanged cache key; copied from the published schema at commit.
    CacheHit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTable {
    pub name: Ident,
    pub cache_key: Option<CacheKey>,
    pub version: Option<String>,
    pub origin: TableOrigin,
}

/// One run of a stage, from `begin_stage` until it is committed or rolled
/// back.
///
/// Materialize, commit and rollback all borrow the handle, so materialize
/// calls may run from several threads and a failed commit can still be
/// rolled back. Dropping a handle that was never committed leaves its
/// working schema in place.
pub struct StageHandle {
    stage: Ident,
    run_id: Ulid,
    schemas: StageSchemas,
    state: Mutex<StageState>,
    /// `None` while the table is being written.
    tables: Mutex<BTreeMap<Ident, Option<StagedTable>>>,
    published: HashMap<Ident, TableMetadata>,
    manager: StageManager,
}

impl StageHandle {
    pub(crate) fn new(stage: Ident, run_id: Ulid, schemas: StageSchemas, manager: StageManager) -> Self {
        Self {
            stage,
            run_id,
            schemas,
            state: Mutex::new(StageState::Pending),
            tables: Mutex::new(BTreeMap::new()),
            published: HashMap::new(),
            manager,
        }
    }

    pub fn stage(&self) -> &Ident {
        &self.stage
    }

    pub fn run_id(&self) -> Ulid {
        self.run_id
    }

    /// Lowercase run id, as stored in metadata and schema names.
    pub fn run_label(&self) -> String {
        self.run_id.to_string().to_lowercase()
    }

    pub fn schemas(&self) -> &StageSchemas {
        &self.schemas
    }

    pub fn working_schema(&self) -> &Ident {
        &self.schemas.working
    }

    pub fn published_schema(&self) -> &Ident {
        &self.schemas.published
    }

    pub fn state(&self) -> StageState {
        *self.state.lock()
    }

    pub(crate) fn transition(&self, next: StageState, operation: &'static str) -> Result<StageState, StageError> {
        let mut state = self.state.lock();
        let previous = *state;
        if !previous.can_transition_to(next) {
            return Err(self.invalid_state(previous, operation));
        }
        *state = next;
        debug!(stage = %self.stage, run = %self.run_label(), from = %previous, to = %next, "stage transition");
        Ok(previous)
    }

    /// Move to `Failed` if the current state allows it.
    pub(crate) fn fail(&self) {
        let _ = self.transition(StageState::Failed, "fail");
    }

    fn invalid_state(&self, state: StageState, operation: &'static str) -> StageError {
        StageError::InvalidState {
            stage: self.stage.clone(),
            state,
            operation,
        }
    }

    pub(crate) fn set_published_metadata(&mut self, published: HashMap<Ident, TableMetadata>) {
        self.published = published;
    }

    /// Metadata of `table` in the schema that was published when the stage
    /// began.
    pub fn published_metadata(&self, table: &Ident) -> Option<&TableMetadata> {
        self.published.get(table)
    }

    /// Claim a table name for this run. The stage must be `Materializing`;
    /// the check and the claim happen under the state lock, so no table can
    /// be claimed once [`StageHandle::begin_commit`] has run.
    pub(crate) fn reserve(&self, table: &Ident) -> Result<(), StageError> {
        let state = self.state.lock();
        if *state != StageState::Materializing {
            return Err(self.invalid_state(*state, "materialize"));
        }
        let mut tables = self.tables.lock();
        if tables.contains_key(table) {
            return Err(StageError::DuplicateTable {
                stage: self.stage.clone(),
                table: table.clone(),
            });
        }
        tables.insert(table.clone(), None);
        Ok(())
    }

    /// Move to `Committing`. Fails, leaving the state alone, while any claimed
    /// table has not been recorded yet.
    pub(crate) fn begin_commit(&self) -> Result<(), StageError> {
        let mut state = self.state.lock();
        if !state.can_transition_to(StageState::Committing) {
            return Err(self.invalid_state(*state, "commit"));
        }
        let in_flight: Vec<Ident> = self
            .tables
            .lock()
            .iter()
            .filter(|(_, staged)| staged.is_none())
            .map(|(name, _)| name.clone())
            .collect();
        if !in_flight.is_empty() {
            return Err(StageError::TablesInFlight {
                stage: self.stage.clone(),
                tables: in_flight,
            });
        }

        let previous = std::mem::replace(&mut *state, StageState::Committing);
        debug!(stage = %self.stage, run = %self.run_label(), from = %previous, to = %*state, "stage transition");
        Ok(())
    }

    pub(crate) fn record(&self, staged: StagedTable) {
        self.tables.lock().insert(staged.name.clone(), Some(staged));
    }

    /// Cache key of a table already recorded in this run.
    pub fn staged_key(&self, table: &Ident) -> Option<CacheKey> {
        self.tables.lock().get(table)?.as_ref()?.cache_key.clone()
    }

    /// Tables written or carried over so far, by name.
    pub fn staged_tables(&self) -> Vec<StagedTable> {
        self.tables.lock().values().flatten().cloned().collect()
    }

    pub fn staged_count(&self) -> usize {
        self.tables.lock().values().filter(|t| t.is_some()).count()
    }
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if !state.is_terminal() {
            debug!(
                stage = %self.stage,
                working = %self.schemas.working,
                %state,
                "stage handle dropped without commit or rollback"
            );
        }
        self.manager.deregister(self.run_id);
    }
}

impl fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHandle")
            .field("stage", &self.stage)
            .field("run_id", &self.run_id)
            .field("working", &self.schemas.working)
            .field("state", &self.state())
            .field("staged", &self.staged_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(manager: &StageManager) -> StageHandle {
        manager.register(&Ident::new("load").unwrap()).unwrap()
    }

    fn staged(name: &str) -> StagedTable {
        StagedTable {
            name: Ident::new(name).unwrap(),
            cache_key: None,
            version: None,
            origin: TableOrigin::Materialized,
        }
    }

    #[test]
    fn test_transitions() {
        let manager = StageManager::new();
        let handle = handle(&manager);
        assert_eq!(handle.state(), StageState::Pending);

        handle.transition(StageState::Materializing, "begin").unwrap();

        let err = handle.transition(StageState::Committed, "commit").unwrap_err();
        assert_eq!(
            err,
            StageError::InvalidState {
                stage: Ident::new("load").unwrap(),
                state: StageState::Materializing,
                operation: "commit",
            }
        );

        handle.fail();
        assert_eq!(handle.state(), StageState::Failed);
        // failing twice keeps the state
        handle.fail();
        assert_eq!(handle.state(), StageState::Failed);
    }

    #[test]
    fn test_reserve_rejects_duplicates() {
        let manager = StageManager::new();
        let handle = handle(&manager);
        let customers = Ident::new("customers").unwrap();

        // nothing can be claimed before the stage starts materializing
        assert!(matches!(
            handle.reserve(&customers),
            Err(StageError::InvalidState { .. })
        ));
        handle.transition(StageState::Materializing, "begin").unwrap();

        handle.reserve(&customers).unwrap();
        assert_eq!(handle.staged_count(), 0);
        assert!(matches!(
            handle.reserve(&customers),
            Err(StageError::DuplicateTable { .. })
        ));

        handle.record(staged("customers"));
        assert_eq!(handle.staged_tables(), vec![staged("customers")]);
    }

    #[test]
    fn test_drop_deregisters() {
        let manager = StageManager::new();
        let run_id = {
            let handle = handle(&manager);
            assert!(manager.is_active(handle.run_id()));
            handle.run_id()
        };
        assert!(!manager.is_active(run_id));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_begin_commit_waits_for_recorded_tables() {
        let manager = StageManager::new();
        let handle = handle(&manager);
        handle.transition(StageState::Materializing, "begin").unwrap();
        let customers = Ident::new("customers").unwrap();
        handle.reserve(&customers).unwrap();

        assert_eq!(
            handle.begin_commit(),
            Err(StageError::TablesInFlight {
                stage: Ident::new("load").unwrap(),
                tables: vec![customers.clone()],
            })
        );
        assert_eq!(handle.state(), StageState::Materializing);
        assert_eq!(handle.staged_key(&customers), None);

        handle.record(StagedTable {
            cache_key: Some(CacheKey::from_stored("abc")),
            ..staged("customers")
        });
        assert_eq!(handle.staged_key(&customers), Some(CacheKey::from_stored("abc")));
        handle.begin_commit().unwrap();
        assert_eq!(handle.state(), StageState::Committing);

        // claims after the commit started are refused
        assert!(matches!(
            handle.reserve(&Ident::new("orders").unwrap()),
            Err(StageError::InvalidState { .. })
        ));
    }
}
