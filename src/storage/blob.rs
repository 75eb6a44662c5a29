//! Blob operations for column and row storage.
//!
//! A table directory holds one `_columns.json` blob with the ordered column
//! definitions and one blob per row. Rows are JSON arrays in column order so
//! a read gives back exactly the column order that was written.
//!
//! ```text
//! customers/
//!   _columns.json       [{"name":"id","data_type":"integer","nullable":true}, ...]
//!   r0000000000.json    [1, "alice"]
//!   r0000000001.json    [2, "bob"]
//! ```

use git2::Repository;
use serde_json::Value;

use crate::catalog::ColumnDef;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// Tree entry name of the column definitions blob.
pub const COLUMNS_ENTRY: &str = "_columns.json";

/// Tree entry name for the row at position `seq`.
///
/// Zero padded so git's byte-wise entry ordering is insertion order.
pub fn row_entry_name(seq: usize) -> String {
    format!("r{:010}.json", seq)
}

/// whether a tree entry name belongs to a row blob
pub fn is_row_entry(name: &str) -> bool {
    name.starts_with('r') && name.ends_with(".json")
}

pub fn write_columns(repo: &Repository, columns: &[ColumnDef]) -> StorageResult<BlobId> {
    let bytes = serde_json::to_vec(columns)?;
    Ok(BlobId::new(repo.blob(&bytes)?))
}

pub fn read_columns(repo: &Repository, id: BlobId) -> StorageResult<Vec<ColumnDef>> {
    let bytes = read_blob(repo, id)?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::CorruptedData {
        path: COLUMNS_ENTRY.to_string(),
        reason: e.to_string(),
    })
}

pub fn write_row(repo: &Repository, values: &[Value]) -> StorageResult<BlobId> {
    let bytes = serde_json::to_vec(values)?;
    Ok(BlobId::new(repo.blob(&bytes)?))
}

pub fn read_row(repo: &Repository, id: BlobId) -> StorageResult<Vec<Value>> {
    let bytes = read_blob(repo, id)?;
    match serde_json::from_slice(&bytes)? {
        Value::Array(values) => Ok(values),
        other => Err(StorageError::CorruptedData {
            path: id.raw().to_string(),
            reason: format!("row blob must be a JSON array, found {}", other),
        }),
    }
}

fn read_blob(repo: &Repository, id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo.find_blob(id.raw())?;
    Ok(blob.content().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_row_entry_ordering() {
        let mut names = vec![row_entry_name(10), row_entry_name(2), row_entry_name(0)];
        names.sort();
        assert_eq!(names, vec![row_entry_name(0), row_entry_name(2), row_entry_name(10)]);
        assert!(is_row_entry(&row_entry_name(7)));
        assert!(!is_row_entry(COLUMNS_ENTRY));
    }

    #[test]
    fn test_columns_and_rows_blobs() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let columns = vec![
            ColumnDef::new("id", DataType::Integer).not_null(),
            ColumnDef::new("name", DataType::Text),
        ];
        let id = write_columns(&repo, &columns).unwrap();
        assert_eq!(read_columns(&repo, id).unwrap(), columns);

        let row = vec![json!(1), json!("alice")];
        let id = write_row(&repo, &row).unwrap();
        assert_eq!(read_row(&repo, id).unwrap(), row);
    }

    #[test]
    fn test_non_array_row_is_corrupted() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let id = BlobId::new(repo.blob(br#"{"id": 1}"#).unwrap());
        assert!(matches!(read_row(&repo, id), Err(StorageError::CorruptedData { .. })));
    }
}
