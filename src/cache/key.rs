//! Cache keys and the functions that derive them.

use std::fmt;

use git2::{ObjectType, Oid};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::Ident;

/// Hex digest identifying one version of a table's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash the parts with git's blob hashing. Parts are NUL separated so
    /// `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn compute(parts: &[&str]) -> Option<Self> {
        let joined = parts.join("\0");
        match Oid::hash_object(ObjectType::Blob, joined.as_bytes()) {
            Ok(oid) => Some(Self(oid.to_string())),
            Err(e) => {
                warn!(error = %e, "cache key hashing failed, caching disabled for this table");
                None
            }
        }
    }

    /// A key read back from the metadata table.
    pub fn from_stored(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a [`CacheKeyFn`] may look at.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyInput<'a> {
    pub stage: &'a Ident,
    pub table: &'a Ident,
    pub version: Option<&'a str>,
    /// payload content fingerprint, or the SQL of a query-shaped payload
    pub fingerprint: Option<&'a str>,
    /// `None` when fresh inputs are ignored
    pub fresh_input: Option<&'a str>,
    /// cache keys of the tables the payload reads, `None` when it reads none
    pub upstream: Option<&'a str>,
}

impl CacheKeyInput<'_> {
    fn key(&self, kind: &str, value: &str) -> Option<CacheKey> {
        let mut parts = vec![kind, self.stage.as_str(), self.table.as_str(), value];
        if let Some(fresh) = self.fresh_input {
            parts.push("fresh");
            parts.push(fresh);
        }
        if let Some(upstream) = self.upstream {
            parts.push("upstream");
            parts.push(upstream);
        }
        CacheKey::compute(&parts)
    }
}

/// Derives a table's cache key. `None` means the table is never served from
/// cache.
pub trait CacheKeyFn: Send + Sync {
    fn name(&self) -> &'static str;

    fn cache_key(&self, input: &CacheKeyInput<'_>) -> Option<CacheKey>;
}

/// Key from the explicit version tag only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitVersion;

impl CacheKeyFn for ExplicitVersion {
    fn name(&self) -> &'static str {
        "explicit_version"
    }

    fn cache_key(&self, input: &CacheKeyInput<'_>) -> Option<CacheKey> {
        input.key("version", input.version?)
    }
}

/// Key from the payload's content or query text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDerived;

impl CacheKeyFn for ContentDerived {
    fn name(&self) -> &'static str {
        "content_derived"
    }

    fn cache_key(&self, input: &CacheKeyInput<'_>) -> Option<CacheKey> {
        input.key("content", input.fingerprint?)
    }
}

/// Explicit version when present, content otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCacheKey;

impl CacheKeyFn for DefaultCacheKey {
    fn name(&self) -> &'static str {
        "default"
    }

    fn cache_key(&self, input: &CacheKeyInput<'_>) -> Option<CacheKey> {
        ExplicitVersion
            .cache_key(input)
            .or_else(|| ContentDerived.cache_key(input))
    }
}
