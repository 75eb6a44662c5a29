//! matstore - a staged-schema table materialization store
//!
//! Pipeline stages hand their output tables to a [`TableStore`], which writes
//! them into a private working schema through a pluggable hook. Once the
//! stage commits, the working schema is swapped into the stage's published
//! schema in one step, so readers only ever see complete stages.
//!
//! SQL is rendered per [`DialectKind`] (Postgres, SQL Server, DB2, DuckDB)
//! and sent through a [`Connection`]. [`LocalConnection`] runs everything
//! against an in-process git-backed engine.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use matstore::{DialectKind, LocalConnection, RowSet, StoreConfig, Table, TableRef, TableStore};
//!
//! let conn = Arc::new(LocalConnection::open("./warehouse").unwrap());
//! let store = TableStore::new(StoreConfig::new(DialectKind::Postgres), conn);
//!
//! let stage = store.begin_stage("load").unwrap();
//! let rows = RowSet::from_records(&[]).unwrap();
//! store.materialize(&stage, Table::new("load", "customers", rows).unwrap()).unwrap();
//! store.commit_stage(&stage).unwrap();
//!
//! let customers: RowSet = store.retrieve_as(&TableRef::new("load", "customers").unwrap()).unwrap();
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod hooks;
pub mod sql;
pub mod stage;
pub mod storage;
pub mod store;
pub mod table;

pub use cache::{CacheKey, CacheKeyFn, CacheMode, TableMetadata};
pub use catalog::{ColumnDef, DataType, Ident, QualifiedName};
pub use config::StoreConfig;
pub use dialect::{DialectAdapter, DialectKind};
pub use driver::{Connection, LocalConnection};
pub use hooks::{HookRegistry, TableHook};
pub use stage::{StageHandle, StageState};
pub use store::{MaterializeOutcome, StoreError, StoreResult, TableStore};
pub use table::{LazyQuery, Payload, PayloadType, RawSql, RowSet, Table, TableRef};
