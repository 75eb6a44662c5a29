//! type-safe wrappers around git primitives for the storage layer.

use std::fmt;

use git2::Oid;

use crate::catalog::Ident;

/// Keeps blob, tree and commit ids from being mixed up.
/// The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ref a schema lives on.
///
/// Schemas are kept outside `refs/heads` so they never show up as branches
/// and a rename is a single ref operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaRef(String);

impl SchemaRef {
    pub const PREFIX: &'static str = "refs/matstore/schemas/";

    pub fn for_schema(schema: &Ident) -> Self {
        Self(format!("{}{}", Self::PREFIX, schema))
    }

    /// extract the schema name from a full ref path
    pub fn schema_of(ref_path: &str) -> Option<Ident> {
        ref_path
            .strip_prefix(Self::PREFIX)
            .and_then(|name| Ident::new(name).ok())
    }

    /// the full ref path, e.g. `refs/matstore/schemas/load`
    pub fn as_ref_path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default signature for store operations
    pub fn matstore() -> Self {
        Self::new("matstore", "matstore@localhost")
    }

    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::matstore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_ref_round_trip() {
        let schema = Ident::new("load__tmp_01hx").unwrap();
        let r = SchemaRef::for_schema(&schema);
        assert_eq!(r.as_ref_path(), "refs/matstore/schemas/load__tmp_01hx");
        assert_eq!(SchemaRef::schema_of(r.as_ref_path()), Some(schema));
    }

    #[test]
    fn test_schema_of_foreign_ref() {
        assert_eq!(SchemaRef::schema_of("refs/heads/main"), None);
        assert_eq!(SchemaRef::schema_of("refs/matstore/schemas/bad-name"), None);
    }
}
