//! SQLite storage for tinyorm entities.
//!
//! This crate connects the pure mapping types of `tinyorm-core` to an
//! embedded SQLite database. It provides a [`Session`] abstraction over
//! parameterized SQL, entity [`Repository`] access with CRUD operations,
//! and a [`MigrationManager`] that applies versioned schema changes exactly
//! once.
//!
//! # Architecture
//!
//! - **`session`**: the [`Session`] trait and [`SqliteSession`]; positional
//!   `?` parameters only
//! - **`config`**: YAML-loadable [`DbConfig`] for opening sessions
//! - **`schema`**: `CREATE`/`DROP TABLE` generation from entity metadata
//! - **`repository`**: typed CRUD and filtered queries
//! - **`migration`**: tracking-table bookkeeping for [`Migration`]s
//! - **`export`**: JSON export of entity tables
//!
//! # Quick start
//!
//! ```
//! use tinyorm_core::*;
//! use tinyorm_sqlite::{Repository, SqliteSession};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Item {
//!     item_id: i64,
//!     name: String,
//!     category: String,
//! }
//!
//! impl Entity for Item {
//!     type Id = i64;
//!
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new("compat_items")
//!             .column(ColumnSpec::id("item_id", "INTEGER"))
//!             .column(ColumnSpec::new("name", "VARCHAR").not_null())
//!             .column(ColumnSpec::new("category", "VARCHAR"))
//!     }
//!
//!     fn to_attributes(&self) -> Attributes {
//!         Attributes::new()
//!             .with("item_id", self.item_id)
//!             .with("name", &self.name)
//!             .with("category", &self.category)
//!     }
//!
//!     fn from_attributes(attrs: &Attributes) -> Result<Self, ConversionError> {
//!         Ok(Item {
//!             item_id: attrs.get("item_id")?,
//!             name: attrs.get("name")?,
//!             category: attrs.get("category")?,
//!         })
//!     }
//! }
//!
//! let session = SqliteSession::open_in_memory().unwrap();
//! let registry = MetadataRegistry::new();
//! let repo: Repository<Item, _> = Repository::new(&session, &registry).unwrap();
//! repo.init(true).unwrap();
//!
//! for (id, name, category) in [(1, "Alpha", "A"), (2, "Beta", "B"), (3, "Gamma", "A")] {
//!     repo.insert(Item { item_id: id, name: name.into(), category: category.into() }).unwrap();
//! }
//!
//! let query = repo.query().and_where("category", "=", "B").or_where("item_id", ">", 2);
//! let names: Vec<String> = repo.execute_query(&query).unwrap().into_iter().map(|i| i.name).collect();
//! assert_eq!(names, vec!["Beta", "Gamma"]);
//! ```

mod config;
mod convert;
mod error;
mod export;
mod migration;
mod repository;
mod schema;
mod session;

pub use config::{DbConfig, DbLocation};
pub use error::{Result, StoreError};
pub use export::{entities_to_json, rows_to_json};
pub use migration::{
    DEFAULT_TRACKING_TABLE, Migration, MigrationManager, MigrationRecord, SqlMigration,
};
pub use repository::Repository;
pub use schema::{generate_create_table_sql, generate_drop_table_sql, generate_tracking_table_sql};
pub use session::{Session, SqliteSession};
