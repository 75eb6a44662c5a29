//! Identifiers and column types shared by every layer.

mod names;
mod types;

pub use names::{Ident, InvalidNameError, QualifiedName};
pub use types::{ColumnDef, DataType};
