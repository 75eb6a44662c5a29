//! Stage manager - tracks running stages and serializes commits.
//!
//! The StageManager handles:
//! - Handing out stage handles with fresh run ids
//! - Tracking which runs are still alive
//! - One commit lock per stage name
//! - Finding working schemas whose run is gone

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use ulid::Ulid;

use super::naming::{parse_working_schema, StageSchemas};
use super::{StageError, StageHandle};
use crate::catalog::{Ident, InvalidNameError};

/// A live stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStage {
    pub stage: Ident,
    pub run_id: Ulid,
    pub working: Ident,
    pub started_at: DateTime<Utc>,
}

/// Thread-safe: clones share the same state.
#[derive(Clone, Default)]
pub struct StageManager {
    inner: Arc<StageManagerInner>,
}

#[derive(Default)]
struct StageManagerInner {
    /// Live runs by run id.
    active: RwLock<HashMap<Ulid, ActiveStage>>,
    /// Commit lock per stage name, created on first use.
    commit_locks: Mutex<HashMap<Ident, Arc<Mutex<()>>>>,
}

impl StageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new run of `stage`. The handle starts `Pending`.
    pub fn register(&self, stage: &Ident) -> Result<StageHandle, InvalidNameError> {
        let run_id = Ulid::new();
        let schemas = StageSchemas::for_stage(stage, run_id)?;

        self.inner.active.write().insert(
            run_id,
            ActiveStage {
                stage: stage.clone(),
                run_id,
                working: schemas.working.clone(),
                started_at: Utc::now(),
            },
        );

        Ok(StageHandle::new(stage.clone(), run_id, schemas, self.clone()))
    }

    pub(crate) fn deregister(&self, run_id: Ulid) {
        self.inner.active.write().remove(&run_id);
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// Live runs, oldest first.
    pub fn active_stages(&self) -> Vec<ActiveStage> {
        let mut stages: Vec<_> = self.inner.active.read().values().cloned().collect();
        stages.sort_by_key(|s| s.run_id);
        stages
    }

    pub fn is_active(&self, run_id: Ulid) -> bool {
        self.inner.active.read().contains_key(&run_id)
    }

    fn commit_lock(&self, stage: &Ident) -> Arc<Mutex<()>> {
        self.inner
            .commit_locks
            .lock()
            .entry(stage.clone())
            .or_default()
            .clone()
    }

    /// Run `f` holding the commit lock of `stage`. Commits of other stages
    /// are not blocked.
    pub fn with_commit_lock<T>(
        &self,
        stage: &Ident,
        timeout: Option<Duration>,
        f: impl FnOnce() -> T,
    ) -> Result<T, StageError> {
        let lock = self.commit_lock(stage);
        let _guard: MutexGuard<'_, ()> = match timeout {
            Some(timeout) => lock.try_lock_for(timeout).ok_or_else(|| StageError::LockTimeout {
                stage: stage.clone(),
                timeout,
            })?,
            None => lock.lock(),
        };
        Ok(f())
    }

    /// Working schemas among `schemas` whose run is not live in this manager.
    pub fn abandoned_working_schemas<'a>(&self, schemas: impl IntoIterator<Item = &'a str>) -> Vec<Ident> {
        let active = self.inner.active.read();
        schemas
            .into_iter()
            .filter_map(|name| {
                let (_, run_id) = parse_working_schema(name)?;
                if active.contains_key(&run_id) {
                    return None;
                }
                Ident::new(name).ok()
            })
            .collect()
    }
}

impl fmt::Debug for StageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageManager")
            .field("active_count", &self.active_count())
            .finish()
    }
}
