//! Error types for entity metadata, query building, and value conversion.
//!
//! These are the "loud" failures: malformed entity declarations and invalid
//! query conditions are reported as soon as they are detected and are never
//! recovered from internally.

use thiserror::Error;

/// A malformed entity declaration.
///
/// Returned when an [`EntitySchema`](crate::EntitySchema) is turned into
/// [`EntityMetadata`](crate::EntityMetadata).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Table or column name is not a plain SQL identifier.
    #[error("invalid identifier '{0}': must be non-empty, start with a letter or underscore, and contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),

    /// The entity declares no columns at all.
    #[error("entity '{0}' declares no columns")]
    NoColumns(String),

    /// No column is marked as the primary key.
    #[error("entity '{0}' has no primary key")]
    MissingPrimaryKey(String),

    /// More than one column is marked as the primary key.
    #[error("entity '{table}' declares multiple primary keys: {columns:?}")]
    MultiplePrimaryKeys { table: String, columns: Vec<String> },

    /// Two columns share an attribute or column name.
    #[error("entity '{table}' declares '{name}' more than once")]
    DuplicateColumn { table: String, name: String },

    /// A column was declared with an empty SQL type.
    #[error("column '{0}' has an empty SQL type")]
    EmptySqlType(String),

    /// A column was declared with a SQL type this crate does not know.
    #[error("column '{column}' has unrecognized SQL type '{sql_type}'")]
    UnknownSqlType { column: String, sql_type: String },

    /// Auto-increment on a non-key or non-integer column.
    #[error("column '{0}' cannot auto-increment: only an integer primary key may")]
    InvalidAutoIncrement(String),
}

/// An invalid query condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBuildError {
    /// Operator text did not match any supported operator.
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    /// Column name is not a plain SQL identifier.
    #[error("invalid column name '{0}'")]
    InvalidColumn(String),

    /// Column is not part of the entity the query is scoped to.
    #[error("unknown column '{column}' for table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Operator and value shape do not fit together (e.g. `IN` with a scalar).
    #[error("invalid condition on '{column}': {reason}")]
    InvalidCondition { column: String, reason: String },
}

/// Failure converting between entities, attributes, and SQL values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// An attribute expected by the metadata was not produced or not found.
    #[error("missing attribute '{0}'")]
    MissingAttribute(String),

    /// A value could not be converted into the requested Rust type.
    #[error("attribute '{attribute}': expected {expected}, found {found}")]
    TypeMismatch {
        attribute: String,
        expected: &'static str,
        found: String,
    },

    /// A result row carried a column the entity does not map.
    #[error("unmapped column '{0}' in result row")]
    UnmappedColumn(String),
}
