//! Cache keys and the per-schema metadata that makes cache hits possible.

mod key;
pub mod metadata;

use serde::{Deserialize, Serialize};

pub use key::{CacheKey, CacheKeyFn, CacheKeyInput, ContentDerived, DefaultCacheKey, ExplicitVersion};
pub use metadata::{MetadataError, TableMetadata, METADATA_TABLE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Enabled,
    /// every table is materialized on every run
    Disabled,
}

impl CacheMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, CacheMode::Enabled)
    }
}
