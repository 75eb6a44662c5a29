//! Validated identifiers for schemas, stages and tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A validated SQL identifier.
///
/// Identifiers double as git ref components and tree entry names in the
/// local engine, and are quoted by every dialect, so they are kept to a
/// conservative subset:
/// - 1-63 characters
/// - ASCII alphanumerics and underscores only
/// - must start with a letter or underscore
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    /// Prefix reserved for tables the store manages itself.
    pub const RESERVED_PREFIX: &'static str = "_matstore";

    const MAX_LEN: usize = 63;

    /// create a new Ident, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Same as [`Ident::new`] but also rejects the reserved prefix.
    pub fn user(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let ident = Self::new(name)?;
        if ident.is_reserved() {
            return Err(InvalidNameError::Reserved(ident.0));
        }
        Ok(ident)
    }

    /// For names fixed at compile time.
    pub(crate) fn from_static(name: &'static str) -> Self {
        debug_assert!(Self::validate(name).is_ok(), "invalid static identifier {}", name);
        Self(name.to_string())
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        let first = match name.chars().next() {
            Some(c) => c,
            None => return Err(InvalidNameError::Empty),
        };

        if name.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(InvalidNameError::InvalidStart(first));
        }

        for (i, c) in name.chars().enumerate() {
            if !c.is_ascii_alphanumeric() && c != '_' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        Ok(())
    }

    /// whether this name lives in the store's reserved namespace
    pub fn is_reserved(&self) -> bool {
        self.0.to_ascii_lowercase().starts_with(Self::RESERVED_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Ident {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Ident {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Ident> for String {
    fn from(ident: Ident) -> Self {
        ident.0
    }
}

/// A `schema.table` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: Ident,
    pub name: Ident,
}

impl QualifiedName {
    pub fn new(schema: Ident, name: Ident) -> Self {
        Self { schema, name }
    }

    /// Parse `schema.table`. Both parts are required.
    pub fn parse(s: &str) -> Result<Self, InvalidNameError> {
        match s.split_once('.') {
            Some((schema, name)) => Ok(Self::new(Ident::new(schema)?, Ident::new(name)?)),
            None => Err(InvalidNameError::Unqualified(s.to_string())),
        }
    }

    /// same table name under another schema
    pub fn in_schema(&self, schema: &Ident) -> Self {
        Self::new(schema.clone(), self.name.clone())
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// error type for invalid identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
    Unqualified(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
            Self::Unqualified(name) => write!(f, "expected schema.table, got '{}'", name),
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_valid() {
        assert!(Ident::new("customers").is_ok());
        assert!(Ident::new("load__tmp_01hz").is_ok());
        assert!(Ident::new("_matstore_tables").is_ok());
        assert!(Ident::new("Stage2").is_ok());
    }

    #[test]
    fn test_ident_invalid() {
        assert_eq!(Ident::new(""), Err(InvalidNameError::Empty));
        assert_eq!(Ident::new("2fast"), Err(InvalidNameError::InvalidStart('2')));
        assert!(Ident::new("my-table").is_err());
        assert!(Ident::new("a.b").is_err());
        assert!(Ident::new("x\"; DROP").is_err());
        assert!(matches!(Ident::new("a".repeat(64)), Err(InvalidNameError::TooLong(64))));
    }

    #[test]
    fn test_reserved_prefix() {
        let meta = Ident::new("_matstore_tables").unwrap();
        assert!(meta.is_reserved());
        assert!(matches!(Ident::user("_matstore_tables"), Err(InvalidNameError::Reserved(_))));
        assert!(Ident::user("_private").is_ok());
    }

    #[test]
    fn test_qualified_name() {
        let q = QualifiedName::parse("load.customers").unwrap();
        assert_eq!(q.schema.as_str(), "load");
        assert_eq!(q.name.as_str(), "customers");
        assert_eq!(q.to_string(), "load.customers");

        let moved = q.in_schema(&Ident::new("load__prev").unwrap());
        assert_eq!(moved.to_string(), "load__prev.customers");

        assert!(matches!(QualifiedName::parse("customers"), Err(InvalidNameError::Unqualified(_))));
    }

    #[test]
    fn test_ident_deserialize_validates() {
        let ok: Ident = serde_json::from_str("\"orders\"").unwrap();
        assert_eq!(ok.as_str(), "orders");
        assert!(serde_json::from_str::<Ident>("\"bad name\"").is_err());
    }
}
