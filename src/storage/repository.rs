//! Core Git repository wrapper.
//!
//! Wraps `git2::Repository` behind a lock and hands out
//! [`StorageSession`]s. `git2::Repository` is `Send` but not `Sync`, so the
//! lock is a mutex; every session is exclusive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use git2::Repository;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::catalog::{Ident, QualifiedName};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::session::StorageSession;
use crate::storage::tree::StoredTable;
use crate::storage::types::GitSignature;

/// The main Git repository wrapper.
///
/// Clone this to share across threads; it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
    signature: GitSignature,
}

impl GitRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        Ok(Self::from_repo(repo, path))
    }

    /// Initialize a new repository. Schemas live on their own refs, so no
    /// initial commit is needed.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;
        debug!(path = %path.display(), "initialized storage repository");
        Ok(Self::from_repo(repo, path))
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    fn from_repo(repo: Repository, path: &Path) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
                signature: GitSignature::matstore(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn lock(&self, timeout: Option<Duration>) -> StorageResult<MutexGuard<'_, Repository>> {
        match timeout {
            Some(timeout) => self
                .inner
                .repo
                .try_lock_for(timeout)
                .ok_or(StorageError::LockTimeout(timeout)),
            None => Ok(self.inner.repo.lock()),
        }
    }

    /// Run `f` with exclusive access to the repository.
    pub fn session<F, T, E>(&self, timeout: Option<Duration>, f: F) -> Result<T, E>
    where
        F: FnOnce(&StorageSession<'_>) -> Result<T, E>,
        E: From<StorageError>,
    {
        let repo = self.lock(timeout)?;
        let session = StorageSession::new(&repo, &self.inner.signature);
        f(&session)
    }

    /// Like [`GitRepository::session`], but every schema ref is put back
    /// the way it was if `f` fails.
    pub fn transaction<F, T, E>(&self, timeout: Option<Duration>, f: F) -> Result<T, E>
    where
        F: FnOnce(&StorageSession<'_>) -> Result<T, E>,
        E: From<StorageError>,
    {
        self.session(timeout, |session| {
            let snapshot = session.snapshot()?;
            match f(session) {
                Ok(value) => Ok(value),
                Err(err) => {
                    if let Err(restore_err) = session.restore(&snapshot) {
                        warn!(error = %restore_err, "failed to restore schema refs after aborted batch");
                    }
                    Err(err)
                }
            }
        })
    }

    // ==================== Convenience reads ====================

    pub fn list_schemas(&self) -> StorageResult<Vec<Ident>> {
        self.session(None, |s| s.list_schemas())
    }

    pub fn list_tables(&self, schema: &Ident) -> StorageResult<Vec<Ident>> {
        self.session(None, |s| s.list_tables(schema))
    }

    pub fn read_table(&self, table: &QualifiedName) -> StorageResult<StoredTable> {
        self.session(None, |s| s.read_table(table))
    }
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.inner.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, DataType};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn ident(s: &str) -> Ident {
        Ident::new(s).unwrap()
    }

    fn qualified(s: &str) -> QualifiedName {
        QualifiedName::parse(s).unwrap()
    }

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", DataType::Integer).not_null(),
            ColumnDef::new("name", DataType::Text),
        ]
    }

    #[test]
    fn test_open_or_init() {
        let dir = TempDir::new().unwrap();
        {
            let repo = GitRepository::open_or_init(dir.path()).unwrap();
            repo.session(None, |s| s.create_schema(&ident("load"), false)).unwrap();
        }
        let repo = GitRepository::open_or_init(dir.path()).unwrap();
        assert_eq!(repo.list_schemas().unwrap(), vec![ident("load")]);
    }

    #[test]
    fn test_open_missing_repository() {
        let dir = TempDir::new().unwrap();
        let result = GitRepository::open(dir.path().join("nope"));
        assert!(matches!(result, Err(StorageError::NotInitialized(_))));
    }

    #[test]
    fn test_table_lifecycle() {
        let (_dir, repo) = setup();
        let table = qualified("load.customers");

        repo.session(None, |s| {
            s.create_schema(&ident("load"), false)?;
            s.create_table(&table, &columns())?;
            s.insert_rows(&table, &[vec![json!(1), json!("alice")], vec![json!(2), json!(null)]])?;
            s.insert_rows(&table, &[vec![json!(3), json!("carol")]])
        })
        .unwrap();

        let stored = repo.read_table(&table).unwrap();
        assert_eq!(stored.columns, columns());
        assert_eq!(stored.rows.len(), 3);
        assert_eq!(stored.rows[2], vec![json!(3), json!("carol")]);

        let dropped = repo.session(None, |s| s.drop_table(&table, false)).unwrap();
        assert!(dropped);
        assert!(matches!(repo.read_table(&table), Err(StorageError::TableNotFound(_))));
        assert!(!repo.session(None, |s| s.drop_table(&table, true)).unwrap());
    }

    #[test]
    fn test_insert_validates_rows() {
        let (_dir, repo) = setup();
        let table = qualified("load.customers");
        repo.session(None, |s| {
            s.create_schema(&ident("load"), false)?;
            s.create_table(&table, &columns())
        })
        .unwrap();

        let arity = repo.session(None, |s| s.insert_rows(&table, &[vec![json!(1)]]));
        assert!(matches!(arity, Err(StorageError::SchemaViolation { .. })));

        let not_null = repo.session(None, |s| s.insert_rows(&table, &[vec![json!(null), json!("x")]]));
        assert!(matches!(not_null, Err(StorageError::SchemaViolation { .. })));

        assert!(repo.read_table(&table).unwrap().rows.is_empty());
    }

    #[test]
    fn test_drop_schema_restrict_and_cascade() {
        let (_dir, repo) = setup();
        let table = qualified("load.customers");
        repo.session(None, |s| {
            s.create_schema(&ident("load"), false)?;
            s.create_table(&table, &columns())
        })
        .unwrap();

        let restrict = repo.session(None, |s| s.drop_schema(&ident("load"), false, false));
        assert!(matches!(restrict, Err(StorageError::SchemaNotEmpty { tables: 1, .. })));

        repo.session(None, |s| s.drop_schema(&ident("load"), false, true)).unwrap();
        assert!(repo.list_schemas().unwrap().is_empty());
        repo.session(None, |s| s.drop_schema(&ident("load"), true, true)).unwrap();
    }

    #[test]
    fn test_copy_and_transfer() {
        let (_dir, repo) = setup();
        let source = qualified("work.orders");
        repo.session(None, |s| {
            s.create_schema(&ident("work"), false)?;
            s.create_schema(&ident("load"), false)?;
            s.create_table_with_rows(&source, &columns(), &[vec![json!(1), json!("a")]])?;
            s.copy_table(&source, &qualified("load.orders_copy"))?;
            s.transfer_table(&source, &ident("load"))
        })
        .unwrap();

        assert_eq!(repo.list_tables(&ident("work")).unwrap(), Vec::<Ident>::new());
        assert_eq!(
            repo.list_tables(&ident("load")).unwrap(),
            vec![ident("orders"), ident("orders_copy")]
        );
        assert_eq!(repo.read_table(&qualified("load.orders")).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_transaction_restores_refs_on_error() {
        let (_dir, repo) = setup();
        repo.session(None, |s| s.create_schema(&ident("load"), false)).unwrap();

        let result: StorageResult<()> = repo.transaction(None, |s| {
            s.rename_schema(&ident("load"), &ident("load__prev"))?;
            s.create_schema(&ident("load"), false)?;
            s.create_table(&qualified("missing.t"), &columns())
        });
        assert!(matches!(result, Err(StorageError::SchemaNotFound(_))));
        assert_eq!(repo.list_schemas().unwrap(), vec![ident("load")]);
    }

    #[test]
    fn test_lock_timeout() {
        let (_dir, repo) = setup();
        let other = repo.clone();
        let result = repo.session(None, |_| {
            other
                .session(Some(Duration::from_millis(20)), |s| s.list_schemas())
                .map(|_| ())
        });
        assert!(matches!(result, Err(StorageError::LockTimeout(_))));
    }
}
