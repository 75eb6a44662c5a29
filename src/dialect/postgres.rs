//! PostgreSQL.

use super::{DialectKind, SqlDialect, SwapStrategy};
use crate::catalog::DataType;

/// Transactional DDL and `ALTER SCHEMA .. RENAME`, so the schema swap is a
/// single atomic transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn type_name(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Text => "TEXT",
            DataType::Integer => "BIGINT",
            DataType::Float => "DOUBLE PRECISION",
            DataType::Boolean => "BOOLEAN",
            DataType::Json => "JSONB",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Uuid => "UUID",
        }
    }

    fn swap_strategy(&self) -> SwapStrategy {
        SwapStrategy::AtomicRename
    }
}
