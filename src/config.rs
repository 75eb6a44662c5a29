//! Store configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::cache::CacheMode;
use crate::dialect::DialectKind;
use crate::driver::ExecOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Options for one [`crate::TableStore`].
///
/// Loadable from JSON; timeouts are given in milliseconds:
///
/// ```json
/// { "dialect": "mssql", "retain_previous": true, "statement_timeout_ms": 30000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Which SQL dialect the adapter renders.
    pub dialect: DialectKind,
    pub cache_mode: CacheMode,
    /// Leave the fresh-input token out of cache keys.
    pub ignore_fresh_input: bool,
    /// Keep `{stage}__prev` after a commit instead of dropping it.
    pub retain_previous: bool,
    /// Leave the working schema of a rolled back run in place.
    pub keep_failed_working_schema: bool,
    /// Per-statement timeout; `None` waits indefinitely.
    #[serde(rename = "statement_timeout_ms", with = "millis")]
    pub statement_timeout: Option<Duration>,
    /// How long a commit waits for another commit of the same stage.
    #[serde(rename = "lock_timeout_ms", with = "millis")]
    pub lock_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Postgres,
            cache_mode: CacheMode::Enabled,
            ignore_fresh_input: false,
            retain_previous: false,
            keep_failed_working_schema: false,
            statement_timeout: None,
            lock_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl StoreConfig {
    pub fn new(dialect: DialectKind) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn ignore_fresh_input(mut self, value: bool) -> Self {
        self.ignore_fresh_input = value;
        self
    }

    pub fn retain_previous(mut self, value: bool) -> Self {
        self.retain_previous = value;
        self
    }

    pub fn keep_failed_working_schema(mut self, value: bool) -> Self {
        self.keep_failed_working_schema = value;
        self
    }

    pub fn statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Options the adapter sends with every statement.
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            timeout: self.statement_timeout,
        }
    }
}

mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.dialect, DialectKind::Postgres);
        assert!(config.cache_mode.is_enabled());
        assert!(!config.retain_previous);
        assert_eq!(config.exec_options(), ExecOptions::default());
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new(DialectKind::Db2)
            .cache_mode(CacheMode::Disabled)
            .retain_previous(true)
            .statement_timeout(Some(Duration::from_secs(5)));

        assert_eq!(config.dialect, DialectKind::Db2);
        assert!(!config.cache_mode.is_enabled());
        assert!(config.retain_previous);
        assert_eq!(config.exec_options().timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_from_json() {
        let config = StoreConfig::from_json(
            r#"{
                "dialect": "mssql",
                "cache_mode": "disabled",
                "keep_failed_working_schema": true,
                "statement_timeout_ms": 1500,
                "lock_timeout_ms": null
            }"#,
        )
        .unwrap();

        assert_eq!(config.dialect, DialectKind::Mssql);
        assert_eq!(config.cache_mode, CacheMode::Disabled);
        assert!(config.keep_failed_working_schema);
        assert!(!config.ignore_fresh_input);
        assert_eq!(config.statement_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.lock_timeout, None);
    }

    #[test]
    fn test_from_json_missing_fields_use_defaults() {
        let config = StoreConfig::from_json(r#"{ "dialect": "duckdb" }"#).unwrap();
        assert_eq!(config.dialect, DialectKind::DuckDb);
        assert_eq!(config.lock_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_json_rejects_unknown() {
        assert!(StoreConfig::from_json(r#"{ "dialekt": "duckdb" }"#).is_err());
        assert!(StoreConfig::from_json(r#"{ "dialect": "oracle" }"#).is_err());
    }
}
