//! Schema reference management.
//!
//! Each schema is a ref under `refs/matstore/schemas/`. Creating, renaming
//! and dropping a schema are single ref operations, so a reader resolving
//! the ref sees either the old or the new state.

use std::collections::BTreeMap;

use git2::{ErrorCode, Oid, Repository};

use crate::catalog::Ident;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{CommitId, SchemaRef};

/// Point-in-time copy of every schema ref, used to undo a failed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSnapshot {
    refs: BTreeMap<String, Oid>,
}

impl RefSnapshot {
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Manages schema refs.
pub struct RefManager;

impl RefManager {
    /// Resolve a schema to its current head commit.
    pub fn resolve(repo: &Repository, schema: &Ident) -> StorageResult<Option<CommitId>> {
        let schema_ref = SchemaRef::for_schema(schema);
        match repo.find_reference(schema_ref.as_ref_path()) {
            Ok(reference) => {
                let commit = reference.peel_to_commit()?;
                Ok(Some(CommitId::new(commit.id())))
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(StorageError::Git(e)),
        }
    }

    pub fn exists(repo: &Repository, schema: &Ident) -> StorageResult<bool> {
        Ok(Self::resolve(repo, schema)?.is_some())
    }

    /// Create a new schema ref pointing to the given commit.
    pub fn create(repo: &Repository, schema: &Ident, target: CommitId) -> StorageResult<()> {
        if Self::exists(repo, schema)? {
            return Err(StorageError::SchemaAlreadyExists(schema.clone()));
        }
        let schema_ref = SchemaRef::for_schema(schema);
        repo.reference(
            schema_ref.as_ref_path(),
            target.raw(),
            false,
            &format!("create schema {}", schema),
        )?;
        Ok(())
    }

    /// Move a schema ref forward, only if it still points to `expected`.
    pub fn update_if_unchanged(
        repo: &Repository,
        schema: &Ident,
        expected: CommitId,
        new_target: CommitId,
    ) -> StorageResult<()> {
        let schema_ref = SchemaRef::for_schema(schema);
        repo.reference_matching(
            schema_ref.as_ref_path(),
            new_target.raw(),
            true,
            expected.raw(),
            &format!("update schema {} to {}", schema, new_target.short()),
        )
        .map_err(|e| match e.code() {
            ErrorCode::Modified | ErrorCode::NotFound => {
                StorageError::ConcurrentModification(schema.clone())
            }
            _ => StorageError::Git(e),
        })?;
        Ok(())
    }

    /// Rename a schema ref. Fails if the target name is taken.
    pub fn rename(repo: &Repository, from: &Ident, to: &Ident) -> StorageResult<()> {
        if Self::exists(repo, to)? {
            return Err(StorageError::SchemaAlreadyExists(to.clone()));
        }
        let from_ref = SchemaRef::for_schema(from);
        let to_ref = SchemaRef::for_schema(to);
        let mut reference = repo
            .find_reference(from_ref.as_ref_path())
            .map_err(|_| StorageError::SchemaNotFound(from.clone()))?;
        reference.rename(
            to_ref.as_ref_path(),
            false,
            &format!("rename schema {} to {}", from, to),
        )?;
        Ok(())
    }

    pub fn delete(repo: &Repository, schema: &Ident) -> StorageResult<()> {
        let schema_ref = SchemaRef::for_schema(schema);
        let mut reference = repo
            .find_reference(schema_ref.as_ref_path())
            .map_err(|_| StorageError::SchemaNotFound(schema.clone()))?;
        reference.delete()?;
        Ok(())
    }

    /// List all schemas, in name order.
    pub fn list(repo: &Repository) -> StorageResult<Vec<Ident>> {
        let mut schemas = Vec::new();
        for reference in repo.references_glob(&format!("{}*", SchemaRef::PREFIX))? {
            let reference = reference?;
            if let Some(schema) = reference.name().and_then(SchemaRef::schema_of) {
                schemas.push(schema);
            }
        }
        schemas.sort();
        Ok(schemas)
    }

    /// Capture the target of every schema ref.
    pub fn snapshot(repo: &Repository) -> StorageResult<RefSnapshot> {
        let mut refs = BTreeMap::new();
        for reference in repo.references_glob(&format!("{}*", SchemaRef::PREFIX))? {
            let reference = reference?;
            if let (Some(name), Some(target)) = (reference.name(), reference.target()) {
                refs.insert(name.to_string(), target);
            }
        }
        Ok(RefSnapshot { refs })
    }

    /// Put every schema ref back to the snapshot: refs created since are
    /// deleted, moved or deleted refs are reset.
    pub fn restore(repo: &Repository, snapshot: &RefSnapshot) -> StorageResult<()> {
        let current = Self::snapshot(repo)?;
        for name in current.refs.keys() {
            if !snapshot.refs.contains_key(name) {
                repo.find_reference(name)?.delete()?;
            }
        }
        for (name, target) in &snapshot.refs {
            if current.refs.get(name) != Some(target) {
                repo.reference(name, *target, true, "restore schema after failed batch")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::CommitBuilder;
    use crate::storage::tree::empty_tree;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Repository, CommitId) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let tree = empty_tree(&repo).unwrap();
        let commit = CommitBuilder::new(&repo).tree(tree).commit().unwrap();
        (dir, repo, commit)
    }

    fn ident(s: &str) -> Ident {
        Ident::new(s).unwrap()
    }

    #[test]
    fn test_create_resolve_list() {
        let (_dir, repo, commit) = setup();
        RefManager::create(&repo, &ident("load"), commit).unwrap();
        RefManager::create(&repo, &ident("clean"), commit).unwrap();

        assert_eq!(RefManager::resolve(&repo, &ident("load")).unwrap(), Some(commit));
        assert_eq!(RefManager::resolve(&repo, &ident("missing")).unwrap(), None);
        assert_eq!(RefManager::list(&repo).unwrap(), vec![ident("clean"), ident("load")]);

        let dup = RefManager::create(&repo, &ident("load"), commit);
        assert!(matches!(dup, Err(StorageError::SchemaAlreadyExists(_))));
    }

    #[test]
    fn test_rename_and_delete() {
        let (_dir, repo, commit) = setup();
        RefManager::create(&repo, &ident("load__tmp_x"), commit).unwrap();
        RefManager::rename(&repo, &ident("load__tmp_x"), &ident("load")).unwrap();
        assert!(!RefManager::exists(&repo, &ident("load__tmp_x")).unwrap());
        assert!(RefManager::exists(&repo, &ident("load")).unwrap());

        RefManager::delete(&repo, &ident("load")).unwrap();
        assert!(RefManager::list(&repo).unwrap().is_empty());
        assert!(matches!(
            RefManager::delete(&repo, &ident("load")),
            Err(StorageError::SchemaNotFound(_))
        ));
    }

    #[test]
    fn test_update_if_unchanged_detects_race() {
        let (_dir, repo, commit) = setup();
        let schema = ident("load");
        RefManager::create(&repo, &schema, commit).unwrap();

        let tree = empty_tree(&repo).unwrap();
        let next = CommitBuilder::new(&repo).tree(tree).parent(commit).commit().unwrap();
        RefManager::update_if_unchanged(&repo, &schema, commit, next).unwrap();

        // the ref has moved on, a second writer holding `commit` must lose
        let other = CommitBuilder::new(&repo).tree(tree).parent(commit).message("other").commit().unwrap();
        let result = RefManager::update_if_unchanged(&repo, &schema, commit, other);
        assert!(matches!(result, Err(StorageError::ConcurrentModification(_))));
        assert_eq!(RefManager::resolve(&repo, &schema).unwrap(), Some(next));
    }

    #[test]
    fn test_snapshot_restore() {
        let (_dir, repo, commit) = setup();
        RefManager::create(&repo, &ident("load"), commit).unwrap();
        let snapshot = RefManager::snapshot(&repo).unwrap();
        assert_eq!(snapshot.len(), 1);

        RefManager::rename(&repo, &ident("load"), &ident("load__prev")).unwrap();
        RefManager::create(&repo, &ident("extra"), commit).unwrap();

        RefManager::restore(&repo, &snapshot).unwrap();
        assert_eq!(RefManager::list(&repo).unwrap(), vec![ident("load")]);
    }
}
