//! Commit creation.
//!
//! every schema mutation is one commit on that schema's ref; the ref only
//! ever moves forward to a commit whose parent is the previous head.

use git2::Repository;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{CommitId, GitSignature, TreeId};

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::matstore(),
        }
    }

    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// create the commit object without moving any ref
    pub fn commit(self) -> StorageResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let sig = self.signature.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self
            .repo
            .commit(None, &sig, &sig, &self.message, &tree, &parent_refs)?;

        Ok(CommitId::new(oid))
    }
}

/// get the tree snapshot at a specific commit
pub fn get_tree_at_commit(repo: &Repository, commit_id: CommitId) -> StorageResult<TreeHandle<'_>> {
    let commit = repo.find_commit(commit_id.raw())?;
    Ok(TreeHandle::new(commit.tree()?))
}

/// message formatting for schema operations
pub struct CommitMessage;

impl CommitMessage {
    pub fn create_schema(schema: &str) -> String {
        format!("[CREATE SCHEMA] {}", schema)
    }

    pub fn create_table(table: &str, columns: usize) -> String {
        format!("[CREATE TABLE] {} ({} columns)", table, columns)
    }

    pub fn drop_table(table: &str) -> String {
        format!("[DROP TABLE] {}", table)
    }

    pub fn insert(table: &str, rows: usize) -> String {
        format!("[INSERT] {} ({} rows)", table, rows)
    }

    pub fn copy_table(source: &str, target: &str) -> String {
        format!("[COPY TABLE] {} -> {}", source, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tree::empty_tree;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_commit_builder_chain() {
        let (_dir, repo) = setup_repo();
        let tree_id = empty_tree(&repo).unwrap();

        let first = CommitBuilder::new(&repo)
            .tree(tree_id)
            .message(CommitMessage::create_schema("load"))
            .commit()
            .unwrap();
        let second = CommitBuilder::new(&repo)
            .tree(tree_id)
            .parent(first)
            .message(CommitMessage::insert("load.customers", 3))
            .commit()
            .unwrap();

        let commit = repo.find_commit(second.raw()).unwrap();
        assert_eq!(commit.parent_ids().collect::<Vec<_>>(), vec![first.raw()]);
        assert_eq!(commit.summary(), Some("[INSERT] load.customers (3 rows)"));
        assert_eq!(commit.author().name(), Some("matstore"));
    }

    #[test]
    fn test_commit_requires_tree() {
        let (_dir, repo) = setup_repo();
        let result = CommitBuilder::new(&repo).message("no tree").commit();
        assert!(matches!(result, Err(StorageError::Internal(_))));
    }

    #[test]
    fn test_tree_at_commit() {
        let (_dir, repo) = setup_repo();
        let tree_id = empty_tree(&repo).unwrap();
        let commit = CommitBuilder::new(&repo).tree(tree_id).commit().unwrap();
        let tree = get_tree_at_commit(&repo, commit).unwrap();
        assert_eq!(tree.id(), tree_id);
    }
}
