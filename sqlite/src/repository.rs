//! CRUD access to one entity table.
//!
//! A [`Repository`] borrows a [`Session`] and holds the entity's validated
//! metadata. It generates every statement from that metadata: column lists
//! follow declaration order, and values are bound in the same order through
//! positional `?` placeholders. Filters go through [`QueryBuilder`], so
//! clause order and parameter order are produced together.
//!
//! Absence is never an error: lookups return `Option`, existence checks
//! return `bool`, and mutations report the number of affected rows.
//!
//! # Example
//!
//! ```
//! # use tinyorm_core::*;
//! # #[derive(Debug, Clone, PartialEq)]
//! # struct Course { id: Option<i64>, name: String, department: String }
//! # impl Entity for Course {
//! #     type Id = i64;
//! #     fn schema() -> EntitySchema {
//! #         EntitySchema::new("courses")
//! #             .column(ColumnSpec::id("id", "INTEGER").auto_increment())
//! #             .column(ColumnSpec::new("name", "VARCHAR").not_null())
//! #             .column(ColumnSpec::new("department", "VARCHAR").not_null())
//! #     }
//! #     fn to_attributes(&self) -> Attributes {
//! #         Attributes::new().with("id", self.id).with("name", &self.name)
//! #             .with("department", &self.department)
//! #     }
//! #     fn from_attributes(a: &Attributes) -> Result<Self, ConversionError> {
//! #         Ok(Course { id: a.get("id")?, name: a.get("name")?, department: a.get("department")? })
//! #     }
//! # }
//! use tinyorm_sqlite::{Repository, SqliteSession};
//!
//! let session = SqliteSession::open_in_memory().unwrap();
//! let registry = MetadataRegistry::new();
//! let repo: Repository<Course, _> = Repository::new(&session, &registry).unwrap();
//! repo.init(false).unwrap();
//!
//! let course = Course { id: None, name: "Python Programming".into(), department: "CS".into() };
//! let saved = repo.save(course).unwrap();
//! assert_eq!(saved.id, Some(1));
//!
//! let cs = repo.find_by(&Criteria::new().eq("department", "CS")).unwrap();
//! assert_eq!(cs, vec![saved]);
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use tinyorm_core::{
    ConversionError, Criteria, Direction, Entity, EntityMetadata, Fragment, FromValue,
    MetadataRegistry, Operator, QueryBuildError, QueryBuilder, Value,
};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::schema::{generate_create_table_sql, generate_drop_table_sql};
use crate::session::Session;

/// Entity-typed access to one table through a borrowed session.
///
/// `S` may be `dyn Session`, so a [`Migration`](crate::Migration) can build
/// repositories over the session it is handed.
pub struct Repository<'s, E: Entity, S: Session + ?Sized> {
    session: &'s S,
    metadata: Arc<EntityMetadata>,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity, S: Session + ?Sized> Repository<'s, E, S> {
    /// Creates a repository, deriving `E`'s metadata through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MetadataError`] if `E`'s declaration is
    /// malformed.
    pub fn new(session: &'s S, registry: &MetadataRegistry) -> Result<Self> {
        let metadata = registry.get::<E>()?;
        Ok(Self::with_metadata(session, metadata))
    }

    /// Creates a repository from already derived metadata.
    pub fn with_metadata(session: &'s S, metadata: Arc<EntityMetadata>) -> Self {
        Self {
            session,
            metadata,
            _entity: PhantomData,
        }
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    pub fn session(&self) -> &'s S {
        self.session
    }

    pub fn table_name(&self) -> &str {
        self.metadata.table_name()
    }

    /// Creates the table if it does not exist.
    ///
    /// With `drop_if_exists` the table is dropped first. The drop and the
    /// create are separate statements: if the create fails, the table is
    /// gone.
    pub fn init(&self, drop_if_exists: bool) -> Result<()> {
        if drop_if_exists {
            warn!(table = self.table_name(), "dropping table before re-creating it");
            self.session
                .execute_batch(&generate_drop_table_sql(&self.metadata))?;
        }
        self.session
            .execute_batch(&generate_create_table_sql(&self.metadata))?;
        info!(table = self.table_name(), "table ready");
        Ok(())
    }

    /// Returns an empty query builder for this table.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(self.table_name())
    }

    /// Inserts an entity and returns it.
    ///
    /// When the primary key is auto-increment and unset, the key column is
    /// left out of the statement and the generated key is read back and set
    /// on the returned entity. Otherwise every column is written.
    ///
    /// # Errors
    ///
    /// [`ConversionError::MissingAttribute`] if the key is unset and not
    /// auto-increment; nothing is written.
    pub fn insert(&self, entity: E) -> Result<E> {
        let meta = &self.metadata;
        let key = meta.primary_key();
        let values = meta.to_column_values(&entity)?;
        let key_unset = values
            .iter()
            .any(|(column, value)| column == &key.column_name && value.is_null());
        if key_unset && !key.auto_increment {
            return Err(ConversionError::MissingAttribute(key.attribute_name.clone()).into());
        }

        let (columns, params): (Vec<String>, Vec<Value>) = values
            .into_iter()
            .filter(|(column, _)| !(key_unset && column == &key.column_name))
            .unzip();

        let mut sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", meta.table_name())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                meta.table_name(),
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };

        if !key_unset {
            self.session.execute(&sql, &params)?;
            return Ok(entity);
        }

        sql.push_str(&format!(" RETURNING {}", key.column_name));
        let generated = self
            .session
            .query_one(&sql, &params)?
            .and_then(|row| row.get_index(0).cloned())
            .ok_or_else(|| StoreError::DatabaseError(rusqlite::Error::QueryReturnedNoRows))?;
        debug!(table = meta.table_name(), key = %generated, "generated primary key");

        let mut attrs = entity.to_attributes();
        attrs.insert(key.attribute_name.clone(), generated);
        Ok(E::from_attributes(&attrs)?)
    }

    /// Updates every non-key column of the row matching the entity's key.
    ///
    /// Returns the number of rows changed: `0` when no row matches or the
    /// key is unset.
    pub fn update(&self, entity: &E) -> Result<usize> {
        let meta = &self.metadata;
        let key = meta.primary_key();
        let key_value = meta.primary_key_value(entity)?;
        if key_value.is_null() {
            debug!(table = meta.table_name(), "update skipped: primary key unset");
            return Ok(0);
        }

        let (columns, mut params): (Vec<String>, Vec<Value>) = meta
            .to_column_values(entity)?
            .into_iter()
            .filter(|(column, _)| column != &key.column_name)
            .unzip();
        if columns.is_empty() {
            return Ok(0);
        }

        let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = ?")).collect();
        let filter = QueryBuilder::new(meta.table_name())
            .and_where(key.column_name.as_str(), Operator::Eq, key_value)
            .build()?;
        params.extend(filter.params);

        let sql = format!(
            "UPDATE {} SET {} {}",
            meta.table_name(),
            assignments.join(", "),
            filter.sql
        );
        self.session.execute(&sql, &params)
    }

    /// Inserts the entity when its key is unset, updates it otherwise.
    pub fn save(&self, entity: E) -> Result<E> {
        if self.metadata.primary_key_value(&entity)?.is_null() {
            self.insert(entity)
        } else {
            self.update(&entity)?;
            Ok(entity)
        }
    }

    /// Loads the entity with the given key, or `None`.
    pub fn find_by_id(&self, id: E::Id) -> Result<Option<E>> {
        let fragment = self.by_id(id).build_select(&self.metadata.column_names())?;
        match self.session.query_one(&fragment.sql, &fragment.params)? {
            Some(row) => Ok(Some(self.metadata.from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Loads every row, ordered by primary key.
    pub fn find_all(&self) -> Result<Vec<E>> {
        let fragment = self
            .query()
            .order_by(self.metadata.primary_key().column_name.as_str(), Direction::Asc)
            .build_select(&self.metadata.column_names())?;
        self.fetch(&fragment)
    }

    /// Loads the rows matching every `name = value` pair of `criteria`.
    pub fn find_by(&self, criteria: &Criteria) -> Result<Vec<E>> {
        let fragment = self
            .criteria_query(criteria)?
            .build_select(&self.metadata.column_names())?;
        self.fetch(&fragment)
    }

    /// Runs an externally composed query against this repository's table.
    ///
    /// The builder's own table name is ignored. Every column it filters or
    /// orders on must be one of this entity's columns.
    pub fn execute_query(&self, query: &QueryBuilder) -> Result<Vec<E>> {
        let referenced = query
            .conditions()
            .iter()
            .map(|c| c.column.as_str())
            .chain(query.order().map(|(column, _)| column));
        for column in referenced {
            if self.metadata.column(column).is_none() {
                return Err(self.unknown_column(column).into());
            }
        }

        let fragment = query
            .scoped_to(self.table_name())
            .build_select(&self.metadata.column_names())?;
        self.fetch(&fragment)
    }

    /// Returns `true` if a row with the given key exists.
    pub fn exists_by_id(&self, id: E::Id) -> Result<bool> {
        let key = self.metadata.primary_key().column_name.as_str();
        let fragment = self.by_id(id).limit(1).build_select(&[key])?;
        Ok(self
            .session
            .query_one(&fragment.sql, &fragment.params)?
            .is_some())
    }

    /// Number of rows in the table.
    pub fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table_name());
        let count = self
            .session
            .query_one(&sql, &[])?
            .and_then(|row| row.get_index(0).and_then(i64::from_value))
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Deletes the row with the given key; returns the number removed.
    pub fn remove_by_id(&self, id: E::Id) -> Result<usize> {
        self.delete_where(&self.by_id(id).build()?)
    }

    /// Deletes the row matching the entity's key.
    pub fn remove(&self, entity: &E) -> Result<usize> {
        let key_value = self.metadata.primary_key_value(entity)?;
        if key_value.is_null() {
            return Ok(0);
        }
        let fragment = self
            .query()
            .and_where(
                self.metadata.primary_key().column_name.as_str(),
                Operator::Eq,
                key_value,
            )
            .build()?;
        self.delete_where(&fragment)
    }

    /// Deletes the rows matching `criteria`, or every row when `criteria`
    /// is `None` or empty.
    ///
    /// A criteria entry naming an unknown attribute or column is an error,
    /// never a silent no-op or full delete.
    pub fn remove_all(&self, criteria: Option<&Criteria>) -> Result<usize> {
        match criteria {
            Some(criteria) if !criteria.is_empty() => {
                let fragment = self.criteria_query(criteria)?.build()?;
                self.delete_where(&fragment)
            }
            _ => {
                warn!(table = self.table_name(), "deleting every row");
                self.delete_where(&Fragment::default())
            }
        }
    }

    fn by_id(&self, id: E::Id) -> QueryBuilder {
        self.query().and_where(
            self.metadata.primary_key().column_name.as_str(),
            Operator::Eq,
            id.into(),
        )
    }

    /// Equality conjunction over `criteria`, with names resolved to columns.
    /// A `NULL` value matches missing values (`IS NULL`).
    fn criteria_query(&self, criteria: &Criteria) -> Result<QueryBuilder> {
        let mut query = self.query();
        for (name, value) in criteria.iter() {
            let column = self
                .metadata
                .resolve_column(name)
                .ok_or_else(|| self.unknown_column(name))?;
            query = if value.is_null() {
                query.where_null(column)
            } else {
                query.and_where(column, Operator::Eq, value.clone())
            };
        }
        Ok(query)
    }

    fn delete_where(&self, filter: &Fragment) -> Result<usize> {
        let mut sql = format!("DELETE FROM {}", self.table_name());
        if !filter.sql.is_empty() {
            sql.push(' ');
            sql.push_str(&filter.sql);
        }
        self.session.execute(&sql, &filter.params)
    }

    fn fetch(&self, fragment: &Fragment) -> Result<Vec<E>> {
        self.session
            .query(&fragment.sql, &fragment.params)?
            .iter()
            .map(|row| self.metadata.from_row(row).map_err(StoreError::from))
            .collect()
    }

    fn unknown_column(&self, column: &str) -> QueryBuildError {
        QueryBuildError::UnknownColumn {
            table: self.table_name().to_string(),
            column: column.to_string(),
        }
    }
}
