//! Schema and table operations against a locked repository.
//!
//! A [`StorageSession`] borrows the repository while its lock is held, so
//! everything done through one session is atomic to other sessions.

use git2::Repository;
use serde_json::Value;
use tracing::trace;

use crate::catalog::{ColumnDef, Ident, QualifiedName};
use crate::storage::blob;
use crate::storage::commit::{self, CommitBuilder, CommitMessage};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::{RefManager, RefSnapshot};
use crate::storage::tree::{self, StoredTable, TreeHandle, TreeMutator};
use crate::storage::types::{BlobId, CommitId, GitSignature, TreeId};

pub struct StorageSession<'a> {
    repo: &'a Repository,
    signature: &'a GitSignature,
}

impl<'a> StorageSession<'a> {
    pub(crate) fn new(repo: &'a Repository, signature: &'a GitSignature) -> Self {
        Self { repo, signature }
    }

    // ==================== Schemas ====================

    pub fn list_schemas(&self) -> StorageResult<Vec<Ident>> {
        RefManager::list(self.repo)
    }

    pub fn schema_exists(&self, schema: &Ident) -> StorageResult<bool> {
        RefManager::exists(self.repo, schema)
    }

    /// Returns false when the schema already existed and `if_not_exists` is set.
    pub fn create_schema(&self, schema: &Ident, if_not_exists: bool) -> StorageResult<bool> {
        if self.schema_exists(schema)? {
            if if_not_exists {
                return Ok(false);
            }
            return Err(StorageError::SchemaAlreadyExists(schema.clone()));
        }

        let tree_id = tree::empty_tree(self.repo)?;
        let commit_id = CommitBuilder::new(self.repo)
            .tree(tree_id)
            .message(CommitMessage::create_schema(schema.as_str()))
            .signature(self.signature.clone())
            .commit()?;
        RefManager::create(self.repo, schema, commit_id)?;
        trace!(%schema, "created schema");
        Ok(true)
    }

    /// Without `cascade` the schema must be empty.
    pub fn drop_schema(&self, schema: &Ident, if_exists: bool, cascade: bool) -> StorageResult<()> {
        if !self.schema_exists(schema)? {
            if if_exists {
                return Ok(());
            }
            return Err(StorageError::SchemaNotFound(schema.clone()));
        }

        if !cascade {
            let tables = self.list_tables(schema)?.len();
            if tables > 0 {
                return Err(StorageError::SchemaNotEmpty {
                    schema: schema.clone(),
                    tables,
                });
            }
        }

        RefManager::delete(self.repo, schema)?;
        trace!(%schema, cascade, "dropped schema");
        Ok(())
    }

    pub fn rename_schema(&self, from: &Ident, to: &Ident) -> StorageResult<()> {
        RefManager::rename(self.repo, from, to)?;
        trace!(%from, %to, "renamed schema");
        Ok(())
    }

    // ==================== Tables ====================

    fn head(&self, schema: &Ident) -> StorageResult<CommitId> {
        RefManager::resolve(self.repo, schema)?
            .ok_or_else(|| StorageError::SchemaNotFound(schema.clone()))
    }

    fn tree_of(&self, schema: &Ident) -> StorageResult<(CommitId, TreeHandle<'a>)> {
        let head = self.head(schema)?;
        let tree = commit::get_tree_at_commit(self.repo, head)?;
        Ok((head, tree))
    }

    /// Commit a new root tree for `schema` on top of `parent`.
    fn advance(&self, schema: &Ident, parent: CommitId, tree_id: TreeId, message: String) -> StorageResult<()> {
        let commit_id = CommitBuilder::new(self.repo)
            .tree(tree_id)
            .parent(parent)
            .message(message)
            .signature(self.signature.clone())
            .commit()?;
        RefManager::update_if_unchanged(self.repo, schema, parent, commit_id)
    }

    pub fn list_tables(&self, schema: &Ident) -> StorageResult<Vec<Ident>> {
        let (_, tree) = self.tree_of(schema)?;
        Ok(tree.list_tables())
    }

    pub fn table_exists(&self, table: &QualifiedName) -> StorageResult<bool> {
        match RefManager::resolve(self.repo, &table.schema)? {
            Some(head) => Ok(commit::get_tree_at_commit(self.repo, head)?.table_exists(&table.name)),
            None => Ok(false),
        }
    }

    pub fn create_table(&self, table: &QualifiedName, columns: &[ColumnDef]) -> StorageResult<()> {
        self.create_table_with_rows(table, columns, &[])
    }

    /// Create a table and fill it in one commit.
    pub fn create_table_with_rows(
        &self,
        table: &QualifiedName,
        columns: &[ColumnDef],
        rows: &[Vec<Value>],
    ) -> StorageResult<()> {
        let (head, tree) = self.tree_of(&table.schema)?;
        if tree.table_exists(&table.name) {
            return Err(StorageError::TableAlreadyExists(table.clone()));
        }
        let blobs = self.write_rows(table, columns, rows)?;

        let mut mutator = TreeMutator::from_tree(self.repo, &tree)?;
        mutator.create_table(&table.name, columns)?;
        if !blobs.is_empty() {
            mutator.append_rows(&table.name, &blobs)?;
        }
        let tree_id = mutator.write()?;

        self.advance(
            &table.schema,
            head,
            tree_id,
            CommitMessage::create_table(&table.to_string(), columns.len()),
        )
    }

    /// Returns whether a table was dropped.
    pub fn drop_table(&self, table: &QualifiedName, if_exists: bool) -> StorageResult<bool> {
        let (head, tree) = match RefManager::resolve(self.repo, &table.schema)? {
            Some(head) => (head, commit::get_tree_at_commit(self.repo, head)?),
            None if if_exists => return Ok(false),
            None => return Err(StorageError::SchemaNotFound(table.schema.clone())),
        };
        if !tree.table_exists(&table.name) {
            if if_exists {
                return Ok(false);
            }
            return Err(StorageError::TableNotFound(table.clone()));
        }

        let mut mutator = TreeMutator::from_tree(self.repo, &tree)?;
        mutator.remove_table(&table.name)?;
        let tree_id = mutator.write()?;
        self.advance(&table.schema, head, tree_id, CommitMessage::drop_table(&table.to_string()))?;
        Ok(true)
    }

    /// Append rows, validating them against the stored columns.
    pub fn insert_rows(&self, table: &QualifiedName, rows: &[Vec<Value>]) -> StorageResult<usize> {
        let (head, tree) = self.tree_of(&table.schema)?;
        let stored = tree
            .load_table(self.repo, &table.name)?
            .ok_or_else(|| StorageError::TableNotFound(table.clone()))?;
        let blobs = self.write_rows(table, &stored.columns, rows)?;

        let mut mutator = TreeMutator::from_tree(self.repo, &tree)?;
        mutator.append_rows(&table.name, &blobs)?;
        let tree_id = mutator.write()?;
        self.advance(&table.schema, head, tree_id, CommitMessage::insert(&table.to_string(), rows.len()))?;
        Ok(rows.len())
    }

    fn write_rows(
        &self,
        table: &QualifiedName,
        columns: &[ColumnDef],
        rows: &[Vec<Value>],
    ) -> StorageResult<Vec<BlobId>> {
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != columns.len() {
                    return Err(StorageError::SchemaViolation {
                        table: table.clone(),
                        reason: format!("row {} has {} values, expected {}", i, row.len(), columns.len()),
                    });
                }
                for (column, value) in columns.iter().zip(row) {
                    column.validate(value).map_err(|reason| StorageError::SchemaViolation {
                        table: table.clone(),
                        reason: format!("row {}: {}", i, reason),
                    })?;
                }
                blob::write_row(self.repo, row)
            })
            .collect()
    }

    pub fn read_table(&self, table: &QualifiedName) -> StorageResult<StoredTable> {
        let (_, tree) = self.tree_of(&table.schema).map_err(|e| match e {
            StorageError::SchemaNotFound(_) => StorageError::TableNotFound(table.clone()),
            other => other,
        })?;
        tree.load_table(self.repo, &table.name)?
            .ok_or_else(|| StorageError::TableNotFound(table.clone()))
    }

    /// Copy a table by linking its tree under the target name. Row blobs are
    /// shared, not rewritten.
    pub fn copy_table(&self, source: &QualifiedName, target: &QualifiedName) -> StorageResult<()> {
        let (_, source_tree) = self.tree_of(&source.schema)?;
        let source_table = source_tree
            .table_tree_id(&source.name)
            .ok_or_else(|| StorageError::TableNotFound(source.clone()))?;

        let (head, target_tree) = self.tree_of(&target.schema)?;
        if target_tree.table_exists(&target.name) {
            return Err(StorageError::TableAlreadyExists(target.clone()));
        }

        let mut mutator = TreeMutator::from_tree(self.repo, &target_tree)?;
        mutator.insert_table_tree(&target.name, source_table)?;
        let tree_id = mutator.write()?;
        self.advance(
            &target.schema,
            head,
            tree_id,
            CommitMessage::copy_table(&source.to_string(), &target.to_string()),
        )
    }

    /// Move a table into another schema under the same name.
    pub fn transfer_table(&self, source: &QualifiedName, target_schema: &Ident) -> StorageResult<()> {
        let target = source.in_schema(target_schema);
        self.copy_table(source, &target)?;
        self.drop_table(source, false)?;
        Ok(())
    }

    // ==================== Batches ====================

    pub fn snapshot(&self) -> StorageResult<RefSnapshot> {
        RefManager::snapshot(self.repo)
    }

    pub fn restore(&self, snapshot: &RefSnapshot) -> StorageResult<()> {
        RefManager::restore(self.repo, snapshot)
    }
}
