//! Core types for mapping Rust records onto SQL tables.
//!
//! This crate holds everything that does not touch a database:
//!
//! - [`Value`] and [`Row`]: SQL scalars and result rows.
//! - [`ColumnSpec`], [`EntitySchema`], [`EntityMetadata`], and the
//!   [`Entity`] trait: the declarative mapping between an entity's
//!   attributes and its table's columns, validated eagerly.
//! - [`MetadataRegistry`]: per-type cache of derived metadata.
//! - [`QueryBuilder`]: fluent filters compiled to SQL with positional `?`
//!   placeholders and an ordered parameter list.
//!
//! The storage side (sessions, repositories, migrations) lives in
//! `tinyorm-sqlite`.
//!
//! # Example
//!
//! ```
//! use tinyorm_core::*;
//!
//! let fragment = QueryBuilder::new("compat_items")
//!     .where_in("item_id", [1, 3])
//!     .build()
//!     .unwrap();
//! assert_eq!(fragment.sql, "WHERE item_id IN (?, ?)");
//! assert_eq!(fragment.params.len(), 2);
//! ```

mod error;
mod metadata;
mod query;
mod registry;
mod validate;
mod value;

pub use error::{ConversionError, MetadataError, QueryBuildError};
pub use metadata::{
    Attributes, ColumnSpec, Entity, EntityMetadata, EntitySchema, is_integer_sql_type,
    is_known_sql_type,
};
pub use query::{
    Condition, ConditionValue, Connector, Criteria, Direction, Fragment, IntoOperator, Operator,
    QueryBuilder,
};
pub use registry::MetadataRegistry;
pub use validate::is_valid_identifier;
pub use value::{FromValue, Row, Value};
