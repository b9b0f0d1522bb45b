//! Error types for sessions, repositories, and migrations.
//!
//! Provides a unified error type covering database access, entity and query
//! validation, value conversion, configuration, and export failures.

use thiserror::Error;
use tinyorm_core::{ConversionError, MetadataError, QueryBuildError};

/// Errors that can occur while talking to the database.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite database operation failure (connectivity, SQL syntax, constraints).
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Malformed entity declaration.
    #[error("metadata error: {0}")]
    MetadataError(#[from] MetadataError),

    /// Invalid query condition.
    #[error("query build error: {0}")]
    QueryBuildError(#[from] QueryBuildError),

    /// Entity/row/value conversion failure.
    #[error("conversion error: {0}")]
    ConversionError(#[from] ConversionError),

    /// Statement used a named parameter; only positional `?` is accepted.
    #[error("named parameter '{0}' is not supported: use positional '?' placeholders")]
    NamedParameter(String),

    /// Bound value count differs from the statement's placeholder count.
    #[error("statement expects {expected} parameters but {actual} were supplied")]
    ParameterCount { expected: usize, actual: usize },

    /// Failure raised by a migration's `up` or `down` procedure.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// Invalid connection configuration.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
