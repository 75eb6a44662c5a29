//! git-backed storage engine behind [`crate::driver::LocalConnection`].
//!
//! A schema is a ref, a table is a directory in that ref's tree and a row is
//! a JSON blob. Upper layers go through [`GitRepository`] and
//! [`StorageSession`] and never touch git2 directly.
//!
//! ```text
//!  refs/matstore/schemas/load ──► commit ──► tree
//!                                             ├── customers/
//!                                             │     ├── _columns.json
//!                                             │     └── r0000000000.json
//!                                             └── _matstore_tables/
//! ```
//!
//! Renaming a schema moves a single ref, which is what makes the
//! rename-based schema swap atomic for readers of this engine.

mod blob;
mod commit;
mod error;
mod refs;
mod repository;
mod session;
mod tree;
mod types;

pub use error::{StorageError, StorageResult};
pub use refs::RefSnapshot;
pub use repository::GitRepository;
pub use session::StorageSession;
pub use tree::StoredTable;
pub use types::{CommitId, GitSignature, SchemaRef};
