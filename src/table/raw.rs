//! SQL text as a table payload.

use std::any::Any;
use std::collections::BTreeMap;

use thiserror::Error;

use super::payload::{Payload, PayloadType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawSqlError {
    #[error("unbound placeholder {{{{{0}}}}}")]
    Unbound(String),

    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
}

/// A SELECT statement written by hand.
///
/// `{{name}}` placeholders are substituted before the statement is sent;
/// values come from [`RawSql::bind`] first, then from the bindings the hook
/// supplies (`target_schema` is always available).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSql {
    sql: String,
    bindings: BTreeMap<String, String>,
}

impl RawSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    /// The unbound SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }

    /// Substitute every placeholder.
    pub fn render(&self, extra: &BTreeMap<String, String>) -> Result<String, RawSqlError> {
        let mut out = String::with_capacity(self.sql.len());
        let mut rest = self.sql.as_str();
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(RawSqlError::Unterminated(offset + start))?;
            let name = after[..end].trim();
            let value = self
                .bindings
                .get(name)
                .or_else(|| extra.get(name))
                .ok_or_else(|| RawSqlError::Unbound(name.to_string()))?;
            out.push_str(value);

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl Payload for RawSql {
    fn payload_type(&self) -> PayloadType {
        PayloadType::of::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}
