//! Deferred queries: the built-in lazy tabular payload.

use std::any::Any;

use super::payload::{Payload, PayloadType};
use crate::catalog::QualifiedName;
use crate::sql::{Expr, Query};

/// A query that has not been run yet.
///
/// Materializing one turns it into `CREATE TABLE .. AS <query>` on the
/// database side; retrieving one hands back a scan of the published table
/// that the caller can refine and evaluate with
/// [`crate::store::TableStore::collect`].
#[derive(Debug, Clone, PartialEq)]
pub struct LazyQuery {
    query: Query,
}

impl LazyQuery {
    pub fn scan(table: QualifiedName) -> Self {
        Self {
            query: Query::scan(table),
        }
    }

    /// Wrap a SELECT given as SQL text.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self {
            query: Query::sql(sql),
        }
    }

    pub fn from_query(query: Query) -> Self {
        Self { query }
    }

    pub fn select<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query: self.query.select(columns),
        }
    }

    pub fn filter(self, predicate: Expr) -> Self {
        Self {
            query: self.query.filter(predicate),
        }
    }

    pub fn order_by(self, column: impl Into<String>, ascending: bool) -> Self {
        Self {
            query: self.query.order_by(column, ascending),
        }
    }

    pub fn limit(self, limit: usize) -> Self {
        Self {
            query: self.query.limit(limit),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn into_query(self) -> Query {
        self.query
    }
}

impl Payload for LazyQuery {
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
