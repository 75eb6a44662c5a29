//! tree operations for table management.
//!
//! in Git, a tree is a directory. A schema's root tree holds one directory
//! per table; each table directory holds the column blob and the row blobs
//! (see [`crate::storage::blob`]).

use git2::{FileMode, ObjectType, Repository, Tree, TreeBuilder as Git2TreeBuilder};
use serde_json::Value;

use crate::catalog::{ColumnDef, Ident};
use crate::storage::blob::{self, COLUMNS_ENTRY};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, TreeId};

/// Columns and rows of a table as read back from a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTable {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
}

/// A read only handle to a schema's tree at a specific commit.
///
/// It is a snapshot: it won't change even if new commits are made.
#[derive(Debug)]
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    pub fn id(&self) -> TreeId {
        TreeId::new(self.tree.id())
    }

    pub(crate) fn inner(&self) -> &Tree<'repo> {
        &self.tree
    }

    /// list all tables (top-level directories), in name order
    pub fn list_tables(&self) -> Vec<Ident> {
        self.tree
            .iter()
            .filter_map(|entry| {
                if entry.kind() != Some(ObjectType::Tree) {
                    return None;
                }
                Ident::new(entry.name()?).ok()
            })
            .collect()
    }

    pub fn table_exists(&self, table: &Ident) -> bool {
        self.table_tree_id(table).is_some()
    }

    /// tree id of a table directory, if present
    pub fn table_tree_id(&self, table: &Ident) -> Option<TreeId> {
        self.tree
            .get_name(table.as_str())
            .filter(|entry| entry.kind() == Some(ObjectType::Tree))
            .map(|entry| TreeId::new(entry.id()))
    }

    /// read a table's columns and all of its rows in insertion order
    pub fn load_table(&self, repo: &'repo Repository, table: &Ident) -> StorageResult<Option<StoredTable>> {
        let tree_id = match self.table_tree_id(table) {
            Some(id) => id,
            None => return Ok(None),
        };
        let table_tree = repo.find_tree(tree_id.raw())?;

        let columns_entry = table_tree.get_name(COLUMNS_ENTRY).ok_or_else(|| {
            StorageError::CorruptedData {
                path: format!("{}/{}", table, COLUMNS_ENTRY),
                reason: "missing column definitions".to_string(),
            }
        })?;
        let columns = blob::read_columns(repo, BlobId::new(columns_entry.id()))?;

        // entries come back sorted by name, which is row order
        let mut rows = Vec::new();
        for entry in table_tree.iter() {
            if entry.kind() != Some(ObjectType::Blob) {
                continue;
            }
            match entry.name() {
                Some(name) if blob::is_row_entry(name) => {
                    rows.push(blob::read_row(repo, BlobId::new(entry.id()))?);
                }
                _ => {}
            }
        }

        Ok(Some(StoredTable { columns, rows }))
    }
}

/// a mutable builder over a schema's root tree
///
/// changes accumulate and produce a new tree on [`TreeMutator::write`];
/// the original tree is not modified.
///
/// ```ignore
/// let mut builder = TreeMutator::from_tree(repo, &tree)?;
/// builder.create_table(&name, &columns)?;
/// builder.append_rows(&name, &blobs)?;
/// let new_tree_id = builder.write()?;
/// ```
pub struct TreeMutator<'repo> {
    repo: &'repo Repository,
    root_builder: Git2TreeBuilder<'repo>,
}

impl<'repo> TreeMutator<'repo> {
    pub fn from_tree(repo: &'repo Repository, tree: &TreeHandle<'_>) -> StorageResult<Self> {
        let root_builder = repo.treebuilder(Some(tree.inner()))?;
        Ok(Self { repo, root_builder })
    }

    pub fn empty(repo: &'repo Repository) -> StorageResult<Self> {
        let root_builder = repo.treebuilder(None)?;
        Ok(Self { repo, root_builder })
    }

    fn table_entry(&self, table: &Ident) -> StorageResult<Option<git2::Oid>> {
        Ok(self.root_builder.get(table.as_str())?.map(|entry| entry.id()))
    }

    pub fn contains(&self, table: &Ident) -> StorageResult<bool> {
        Ok(self.table_entry(table)?.is_some())
    }

    /// create (or replace) a table directory holding only its column blob
    pub fn create_table(&mut self, table: &Ident, columns: &[ColumnDef]) -> StorageResult<()> {
        let columns_blob = blob::write_columns(self.repo, columns)?;
        let mut table_builder = self.repo.treebuilder(None)?;
        table_builder.insert(COLUMNS_ENTRY, columns_blob.raw(), FileMode::Blob.into())?;
        let table_tree = table_builder.write()?;
        self.root_builder.insert(table.as_str(), table_tree, FileMode::Tree.into())?;
        Ok(())
    }

    /// link an existing table tree under a (possibly new) name
    pub fn insert_table_tree(&mut self, table: &Ident, tree_id: TreeId) -> StorageResult<()> {
        self.root_builder.insert(table.as_str(), tree_id.raw(), FileMode::Tree.into())?;
        Ok(())
    }

    pub fn remove_table(&mut self, table: &Ident) -> StorageResult<()> {
        self.root_builder.remove(table.as_str())?;
        Ok(())
    }

    /// append row blobs after the table's existing rows
    pub fn append_rows(&mut self, table: &Ident, rows: &[BlobId]) -> StorageResult<()> {
        let table_oid = self.table_entry(table)?.ok_or_else(|| {
            StorageError::Internal(format!("append to missing table directory {}", table))
        })?;
        let table_tree = self.repo.find_tree(table_oid)?;

        let next = table_tree
            .iter()
            .filter(|entry| entry.name().map(blob::is_row_entry).unwrap_or(false))
            .count();

        let mut table_builder = self.repo.treebuilder(Some(&table_tree))?;
        for (offset, row) in rows.iter().enumerate() {
            let name = blob::row_entry_name(next + offset);
            table_builder.insert(name.as_str(), row.raw(), FileMode::Blob.into())?;
        }
        let new_table_tree = table_builder.write()?;
        self.root_builder.insert(table.as_str(), new_table_tree, FileMode::Tree.into())?;
        Ok(())
    }

    /// write all changes and return the new root tree ID
    pub fn write(self) -> StorageResult<TreeId> {
        Ok(TreeId::new(self.root_builder.write()?))
    }
}

/// root tree of a freshly created, empty schema
pub fn empty_tree(repo: &Repository) -> StorageResult<TreeId> {
    TreeMutator::empty(repo)?.write()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", DataType::Integer),
            ColumnDef::new("name", DataType::Text),
        ]
    }

    #[test]
    fn test_list_tables_empty() {
        let (_dir, repo) = setup_repo();
        let tree_id = empty_tree(&repo).unwrap();
        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());
        assert!(handle.list_tables().is_empty());
    }

    #[test]
    fn test_create_table_and_append_rows() {
        let (_dir, repo) = setup_repo();
        let table = Ident::new("customers").unwrap();

        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.create_table(&table, &columns()).unwrap();
        let first = blob::write_row(&repo, &[json!(1), json!("alice")]).unwrap();
        mutator.append_rows(&table, &[first]).unwrap();
        let tree_id = mutator.write().unwrap();

        // second batch lands after the first
        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());
        let mut mutator = TreeMutator::from_tree(&repo, &handle).unwrap();
        let second = blob::write_row(&repo, &[json!(2), json!("bob")]).unwrap();
        mutator.append_rows(&table, &[second]).unwrap();
        let tree_id = mutator.write().unwrap();

        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());
        assert_eq!(handle.list_tables(), vec![table.clone()]);
        let stored = handle.load_table(&repo, &table).unwrap().unwrap();
        assert_eq!(stored.columns, columns());
        assert_eq!(stored.rows, vec![vec![json!(1), json!("alice")], vec![json!(2), json!("bob")]]);
    }

    #[test]
    fn test_insert_table_tree_shares_content() {
        let (_dir, repo) = setup_repo();
        let source = Ident::new("orders").unwrap();
        let copy = Ident::new("orders_copy").unwrap();

        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.create_table(&source, &columns()).unwrap();
        let tree_id = mutator.write().unwrap();
        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());
        let source_tree = handle.table_tree_id(&source).unwrap();

        let mut mutator = TreeMutator::from_tree(&repo, &handle).unwrap();
        mutator.insert_table_tree(&copy, source_tree).unwrap();
        let tree_id = mutator.write().unwrap();
        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());

        assert_eq!(handle.table_tree_id(&copy), Some(source_tree));
    }

    #[test]
    fn test_remove_table() {
        let (_dir, repo) = setup_repo();
        let table = Ident::new("customers").unwrap();

        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.create_table(&table, &columns()).unwrap();
        assert!(mutator.contains(&table).unwrap());
        mutator.remove_table(&table).unwrap();
        assert!(!mutator.contains(&table).unwrap());
        let tree_id = mutator.write().unwrap();

        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());
        assert!(handle.load_table(&repo, &table).unwrap().is_none());
    }
}
