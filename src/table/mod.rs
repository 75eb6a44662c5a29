//! Tables handed to and returned by the store.

mod lazy;
mod payload;
mod raw;
mod rowset;

use std::fmt;

pub use lazy::LazyQuery;
pub use payload::{Payload, PayloadType};
pub use raw::{RawSql, RawSqlError};
pub use rowset::{RowSet, RowSetError};

use crate::catalog::{Ident, InvalidNameError, QualifiedName};

/// A computed table produced by a pipeline stage.
#[derive(Debug)]
pub struct Table {
    name: Ident,
    stage: Ident,
    payload: Box<dyn Payload>,
    version: Option<String>,
    fresh_input: Option<String>,
}

impl Table {
    /// Names are validated; table names may not use the reserved prefix.
    pub fn new(stage: &str, name: &str, payload: impl Payload) -> Result<Self, InvalidNameError> {
        Ok(Self::from_boxed(Ident::new(stage)?, Ident::user(name)?, Box::new(payload)))
    }

    pub fn from_boxed(stage: Ident, name: Ident, payload: Box<dyn Payload>) -> Self {
        Self {
            name,
            stage,
            payload,
            version: None,
            fresh_input: None,
        }
    }

    /// Explicit version tag for cache keys.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Token that invalidates the cache key when external inputs change.
    pub fn with_fresh_input(mut self, token: impl Into<String>) -> Self {
        self.fresh_input = Some(token.into());
        self
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn stage(&self) -> &Ident {
        &self.stage
    }

    pub fn payload(&self) -> &dyn Payload {
        self.payload.as_ref()
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload.payload_type()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn fresh_input(&self) -> Option<&str> {
        self.fresh_input.as_deref()
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef {
            stage: self.stage.clone(),
            name: self.name.clone(),
        }
    }

    pub fn into_payload(self) -> Box<dyn Payload> {
        self.payload
    }
}

/// Address of a table: the stage that produced it and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub stage: Ident,
    pub name: Ident,
}

impl TableRef {
    pub fn new(stage: &str, name: &str) -> Result<Self, InvalidNameError> {
        Ok(Self {
            stage: Ident::new(stage)?,
            name: Ident::new(name)?,
        })
    }

    /// The table inside `schema`.
    pub fn in_schema(&self, schema: &Ident) -> QualifiedName {
        QualifiedName::new(schema.clone(), self.name.clone())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stage, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, DataType};

    #[test]
    fn test_table_names_validated() {
        let rows = RowSet::new(vec![ColumnDef::new("id", DataType::Integer)]);
        let table = Table::new("load", "customers", rows.clone())
            .unwrap()
            .with_version("v1");
        assert_eq!(table.version(), Some("v1"));
        assert!(table.fresh_input().is_none());
        assert_eq!(table.table_ref().to_string(), "load.customers");
        assert!(table.payload().is::<RowSet>());

        assert!(Table::new("load", "_matstore_tables", rows.clone()).is_err());
        assert!(Table::new("bad stage", "customers", rows).is_err());
    }

    #[test]
    fn test_table_ref_in_schema() {
        let r = TableRef::new("load", "orders").unwrap();
        let schema = Ident::new("load__prev").unwrap();
        assert_eq!(r.in_schema(&schema).to_string(), "load__prev.orders");
    }
}
