//! Entity metadata: how a Rust record maps onto a table.
//!
//! An entity describes itself with an explicit [`EntitySchema`] built from
//! [`ColumnSpec`] declarations. [`EntityMetadata::from_schema`] validates the
//! declaration eagerly and produces the immutable metadata used to generate
//! SQL and to convert between entities and rows.
//!
//! # Example
//!
//! ```
//! use tinyorm_core::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Course {
//!     id: Option<i64>,
//!     name: String,
//!     department: String,
//! }
//!
//! impl Entity for Course {
//!     type Id = i64;
//!
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new("courses")
//!             .column(ColumnSpec::id("id", "INTEGER").auto_increment())
//!             .column(ColumnSpec::new("name", "VARCHAR").not_null())
//!             .column(ColumnSpec::new("department", "VARCHAR").not_null())
//!     }
//!
//!     fn to_attributes(&self) -> Attributes {
//!         Attributes::new()
//!             .with("id", self.id)
//!             .with("name", &self.name)
//!             .with("department", &self.department)
//!     }
//!
//!     fn from_attributes(attrs: &Attributes) -> Result<Self, ConversionError> {
//!         Ok(Course {
//!             id: attrs.get("id")?,
//!             name: attrs.get("name")?,
//!             department: attrs.get("department")?,
//!         })
//!     }
//! }
//!
//! let meta = EntityMetadata::of::<Course>().unwrap();
//! assert_eq!(meta.table_name(), "courses");
//! assert_eq!(meta.primary_key().column_name, "id");
//! assert!(meta.primary_key().auto_increment);
//! ```

use std::collections::{BTreeMap, HashSet};

use crate::error::{ConversionError, MetadataError};
use crate::validate::is_valid_identifier;
use crate::value::{FromValue, Row, Value};

/// SQL base types accepted in column declarations.
///
/// Matching is case-insensitive and ignores a trailing precision/length
/// suffix such as `VARCHAR(255)` or `DECIMAL(10, 2)`.
const KNOWN_SQL_TYPES: &[&str] = &[
    "INTEGER",
    "INT",
    "BIGINT",
    "SMALLINT",
    "TINYINT",
    "HUGEINT",
    "UBIGINT",
    "UINTEGER",
    "REAL",
    "FLOAT",
    "DOUBLE",
    "DECIMAL",
    "NUMERIC",
    "VARCHAR",
    "CHAR",
    "TEXT",
    "STRING",
    "BOOLEAN",
    "BOOL",
    "DATE",
    "TIME",
    "TIMESTAMP",
    "TIMESTAMPTZ",
    "BLOB",
    "UUID",
    "JSON",
];

const INTEGER_SQL_TYPES: &[&str] = &[
    "INTEGER", "INT", "BIGINT", "SMALLINT", "TINYINT", "HUGEINT", "UBIGINT", "UINTEGER",
];

/// Returns the upper-cased base name of a SQL type (`varchar(20)` -> `VARCHAR`).
fn base_type(sql_type: &str) -> String {
    let base = sql_type.split('(').next().unwrap_or_default();
    base.trim().to_ascii_uppercase()
}

/// Returns `true` if `sql_type` names a recognized SQL type.
pub fn is_known_sql_type(sql_type: &str) -> bool {
    let base = base_type(sql_type);
    KNOWN_SQL_TYPES.contains(&base.as_str())
}

/// Returns `true` if `sql_type` names an integer type.
pub fn is_integer_sql_type(sql_type: &str) -> bool {
    let base = base_type(sql_type);
    INTEGER_SQL_TYPES.contains(&base.as_str())
}

/// Declaration of one entity attribute and the column that stores it.
///
/// By default the column name equals the attribute name; use
/// [`column`](Self::column) to store it under a different name.
///
/// # Examples
///
/// ```
/// use tinyorm_core::ColumnSpec;
///
/// let id = ColumnSpec::id("item_id", "INTEGER");
/// assert!(id.is_primary_key);
/// assert!(id.not_null);
///
/// let name = ColumnSpec::new("display_name", "VARCHAR").column("name").not_null();
/// assert_eq!(name.attribute_name, "display_name");
/// assert_eq!(name.column_name, "name");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Name of the attribute on the Rust entity.
    pub attribute_name: String,
    /// Name of the table column.
    pub column_name: String,
    /// Declared SQL type (upper-cased once validated).
    pub sql_type: String,
    pub not_null: bool,
    pub auto_increment: bool,
    pub is_primary_key: bool,
}

impl ColumnSpec {
    /// Declares a regular (nullable, non-key) column.
    pub fn new(attribute: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let attribute_name = attribute.into();
        Self {
            column_name: attribute_name.clone(),
            attribute_name,
            sql_type: sql_type.into(),
            not_null: false,
            auto_increment: false,
            is_primary_key: false,
        }
    }

    /// Declares the primary-key column. Primary keys are always `NOT NULL`.
    pub fn id(attribute: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let mut spec = Self::new(attribute, sql_type);
        spec.is_primary_key = true;
        spec.not_null = true;
        spec
    }

    /// Stores the attribute under a different column name.
    pub fn column(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = column_name.into();
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Lets the database generate the value on insert.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// Unvalidated entity declaration: a table name plus ordered columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
}

impl EntitySchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    /// Appends a column; declaration order becomes column order.
    pub fn column(mut self, spec: ColumnSpec) -> Self {
        self.columns.push(spec);
        self
    }
}

/// Attribute values of one entity instance, keyed by attribute name.
///
/// Produced by [`Entity::to_attributes`] for writes and handed to
/// [`Entity::from_attributes`] for reads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes {
    values: BTreeMap<String, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(attribute, value);
        self
    }

    /// Sets an attribute, replacing any previous value.
    pub fn insert(&mut self, attribute: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(attribute.into(), value.into());
    }

    /// Returns the raw value of an attribute.
    pub fn value(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    /// Returns an attribute converted to `T`.
    ///
    /// # Errors
    ///
    /// [`ConversionError::MissingAttribute`] if the attribute is absent, or
    /// [`ConversionError::TypeMismatch`] if the value does not fit `T`.
    pub fn get<T: FromValue>(&self, attribute: &str) -> Result<T, ConversionError> {
        let value = self
            .values
            .get(attribute)
            .ok_or_else(|| ConversionError::MissingAttribute(attribute.to_string()))?;
        T::from_value(value).ok_or_else(|| ConversionError::TypeMismatch {
            attribute: attribute.to_string(),
            expected: T::EXPECTED,
            found: value.kind().to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A record type stored one-to-one in a table.
///
/// Implementations describe their columns in [`schema`](Self::schema) and
/// convert to and from [`Attributes`]. An unset primary key is represented
/// by a `NULL` attribute value (typically an `Option` field holding `None`).
pub trait Entity: Sized + 'static {
    /// Primary-key type accepted by lookups such as `find_by_id`.
    type Id: Into<Value>;

    /// Declares the table and its columns.
    fn schema() -> EntitySchema;

    /// Reads every attribute of this instance.
    fn to_attributes(&self) -> Attributes;

    /// Builds an instance from attribute values.
    fn from_attributes(attrs: &Attributes) -> Result<Self, ConversionError>;
}

/// Validated, immutable mapping between an entity type and its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    table_name: String,
    columns: Vec<ColumnSpec>,
    primary_key: usize,
}

impl EntityMetadata {
    /// Derives and validates the metadata of entity type `E`.
    pub fn of<E: Entity>() -> Result<Self, MetadataError> {
        Self::from_schema(E::schema())
    }

    /// Validates a schema declaration.
    ///
    /// # Errors
    ///
    /// Returns a [`MetadataError`] if the table or a column name is not a
    /// plain identifier, a name is declared twice, there is not exactly one
    /// primary key, a SQL type is empty or unrecognized, or auto-increment is
    /// requested anywhere but on an integer primary key.
    pub fn from_schema(schema: EntitySchema) -> Result<Self, MetadataError> {
        let EntitySchema {
            table_name,
            mut columns,
        } = schema;

        if !is_valid_identifier(&table_name) {
            return Err(MetadataError::InvalidIdentifier(table_name));
        }
        if columns.is_empty() {
            return Err(MetadataError::NoColumns(table_name));
        }

        let mut seen_attributes: HashSet<&str> = HashSet::new();
        let mut seen_columns: HashSet<&str> = HashSet::new();
        for spec in &columns {
            if !is_valid_identifier(&spec.column_name) {
                return Err(MetadataError::InvalidIdentifier(spec.column_name.clone()));
            }
            if !seen_attributes.insert(spec.attribute_name.as_str()) {
                return Err(MetadataError::DuplicateColumn {
                    table: table_name.clone(),
                    name: spec.attribute_name.clone(),
                });
            }
            if !seen_columns.insert(spec.column_name.as_str()) {
                return Err(MetadataError::DuplicateColumn {
                    table: table_name.clone(),
                    name: spec.column_name.clone(),
                });
            }
            if spec.sql_type.trim().is_empty() {
                return Err(MetadataError::EmptySqlType(spec.column_name.clone()));
            }
            if !is_known_sql_type(&spec.sql_type) {
                return Err(MetadataError::UnknownSqlType {
                    column: spec.column_name.clone(),
                    sql_type: spec.sql_type.clone(),
                });
            }
            if spec.auto_increment
                && (!spec.is_primary_key || !is_integer_sql_type(&spec.sql_type))
            {
                return Err(MetadataError::InvalidAutoIncrement(spec.column_name.clone()));
            }
        }

        let keys: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary_key)
            .map(|(i, _)| i)
            .collect();
        let primary_key = match keys.as_slice() {
            [] => return Err(MetadataError::MissingPrimaryKey(table_name)),
            [single] => *single,
            many => {
                return Err(MetadataError::MultiplePrimaryKeys {
                    table: table_name,
                    columns: many.iter().map(|&i| columns[i].column_name.clone()).collect(),
                });
            }
        };

        for spec in &mut columns {
            spec.sql_type = spec.sql_type.trim().to_ascii_uppercase();
        }

        Ok(Self {
            table_name,
            columns,
            primary_key,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn primary_key(&self) -> &ColumnSpec {
        &self.columns[self.primary_key]
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column_name.as_str()).collect()
    }

    /// Looks a column up by column name.
    pub fn column(&self, column_name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.column_name == column_name)
    }

    /// Column name storing `attribute`.
    pub fn column_for(&self, attribute: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.attribute_name == attribute)
            .map(|c| c.column_name.as_str())
    }

    /// Attribute name stored in `column`.
    pub fn attribute_for(&self, column: &str) -> Option<&str> {
        self.column(column).map(|c| c.attribute_name.as_str())
    }

    /// Resolves a name given either as an attribute or as a column.
    ///
    /// Attribute names win when a name is both (one attribute renamed onto
    /// another's column name).
    pub fn resolve_column(&self, name: &str) -> Option<&str> {
        self.column_for(name)
            .or_else(|| self.column(name).map(|c| c.column_name.as_str()))
    }

    /// Returns the entity's values as `(column, value)` pairs in column order.
    ///
    /// # Errors
    ///
    /// [`ConversionError::MissingAttribute`] if the entity does not produce
    /// a value for a declared attribute.
    pub fn to_column_values<E: Entity>(
        &self,
        entity: &E,
    ) -> Result<Vec<(String, Value)>, ConversionError> {
        let attrs = entity.to_attributes();
        self.columns
            .iter()
            .map(|c| {
                attrs
                    .value(&c.attribute_name)
                    .cloned()
                    .map(|v| (c.column_name.clone(), v))
                    .ok_or_else(|| ConversionError::MissingAttribute(c.attribute_name.clone()))
            })
            .collect()
    }

    /// Returns the primary-key value of an entity (`NULL` when unset).
    pub fn primary_key_value<E: Entity>(&self, entity: &E) -> Result<Value, ConversionError> {
        let key = self.primary_key();
        entity
            .to_attributes()
            .value(&key.attribute_name)
            .cloned()
            .ok_or_else(|| ConversionError::MissingAttribute(key.attribute_name.clone()))
    }

    /// Builds an entity from a result row.
    ///
    /// Every row column must map to a declared column; declared columns
    /// missing from the row surface as missing attributes in
    /// [`Entity::from_attributes`].
    pub fn from_row<E: Entity>(&self, row: &Row) -> Result<E, ConversionError> {
        let mut attrs = Attributes::new();
        for (column, value) in row.iter() {
            let attribute = self
                .attribute_for(column)
                .ok_or_else(|| ConversionError::UnmappedColumn(column.to_string()))?;
            attrs.insert(attribute, value.clone());
        }
        E::from_attributes(&attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        item_id: Option<i64>,
        label: String,
        score: i32,
    }

    impl Entity for Item {
        type Id = i64;

        fn schema() -> EntitySchema {
            EntitySchema::new("items")
                .column(ColumnSpec::id("item_id", "integer").auto_increment())
                .column(ColumnSpec::new("label", "varchar(40)").column("name").not_null())
                .column(ColumnSpec::new("score", "INTEGER"))
        }

        fn to_attributes(&self) -> Attributes {
            Attributes::new()
                .with("item_id", self.item_id)
                .with("label", &self.label)
                .with("score", self.score)
        }

        fn from_attributes(attrs: &Attributes) -> Result<Self, ConversionError> {
            Ok(Item {
                item_id: attrs.get("item_id")?,
                label: attrs.get("label")?,
                score: attrs.get("score")?,
            })
        }
    }

    fn schema_with(columns: Vec<ColumnSpec>) -> EntitySchema {
        columns
            .into_iter()
            .fold(EntitySchema::new("t"), EntitySchema::column)
    }

    #[test]
    fn test_metadata_from_entity() {
        let meta = EntityMetadata::of::<Item>().unwrap();
        assert_eq!(meta.table_name(), "items");
        assert_eq!(meta.column_names(), vec!["item_id", "name", "score"]);
        assert_eq!(meta.primary_key().attribute_name, "item_id");
        assert_eq!(meta.columns()[0].sql_type, "INTEGER");
        assert_eq!(meta.columns()[1].sql_type, "VARCHAR(40)");
        assert!(meta.columns()[1].not_null);
        assert!(!meta.columns()[2].not_null);
    }

    #[test]
    fn test_attribute_column_translation() {
        let meta = EntityMetadata::of::<Item>().unwrap();
        assert_eq!(meta.column_for("label"), Some("name"));
        assert_eq!(meta.attribute_for("name"), Some("label"));
        assert_eq!(meta.column_for("name"), None);
        assert_eq!(meta.resolve_column("label"), Some("name"));
        assert_eq!(meta.resolve_column("name"), Some("name"));
        assert_eq!(meta.resolve_column("nope"), None);
    }

    #[test]
    fn test_missing_primary_key() {
        let err = EntityMetadata::from_schema(schema_with(vec![ColumnSpec::new("a", "TEXT")]))
            .unwrap_err();
        assert_eq!(err, MetadataError::MissingPrimaryKey("t".into()));
    }

    #[test]
    fn test_multiple_primary_keys() {
        let err = EntityMetadata::from_schema(schema_with(vec![
            ColumnSpec::id("a", "INTEGER"),
            ColumnSpec::id("b", "INTEGER"),
        ]))
        .unwrap_err();
        assert!(matches!(err, MetadataError::MultiplePrimaryKeys { ref columns, .. } if columns == &["a", "b"]));
    }

    #[test]
    fn test_empty_and_unknown_sql_types() {
        let err = EntityMetadata::from_schema(schema_with(vec![
            ColumnSpec::id("a", "INTEGER"),
            ColumnSpec::new("b", "  "),
        ]))
        .unwrap_err();
        assert_eq!(err, MetadataError::EmptySqlType("b".into()));

        let err = EntityMetadata::from_schema(schema_with(vec![
            ColumnSpec::id("a", "INTEGER"),
            ColumnSpec::new("b", "SPREADSHEET"),
        ]))
        .unwrap_err();
        assert!(matches!(err, MetadataError::UnknownSqlType { .. }));
    }

    #[test]
    fn test_auto_increment_restrictions() {
        let err = EntityMetadata::from_schema(schema_with(vec![
            ColumnSpec::id("a", "VARCHAR").auto_increment(),
        ]))
        .unwrap_err();
        assert_eq!(err, MetadataError::InvalidAutoIncrement("a".into()));

        let err = EntityMetadata::from_schema(schema_with(vec![
            ColumnSpec::id("a", "INTEGER"),
            ColumnSpec::new("b", "INTEGER").auto_increment(),
        ]))
        .unwrap_err();
        assert_eq!(err, MetadataError::InvalidAutoIncrement("b".into()));
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let err = EntityMetadata::from_schema(schema_with(vec![
            ColumnSpec::id("a", "INTEGER"),
            ColumnSpec::new("b", "TEXT").column("a"),
        ]))
        .unwrap_err();
        assert!(matches!(err, MetadataError::DuplicateColumn { ref name, .. } if name == "a"));

        let err = EntityMetadata::from_schema(schema_with(vec![
            ColumnSpec::id("a", "INTEGER"),
            ColumnSpec::new("b", "TEXT").column("b; DROP TABLE t"),
        ]))
        .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidIdentifier(_)));

        let err = EntityMetadata::from_schema(EntitySchema::new("bad table")).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidIdentifier(_)));

        let err = EntityMetadata::from_schema(EntitySchema::new("empty")).unwrap_err();
        assert_eq!(err, MetadataError::NoColumns("empty".into()));
    }

    #[test]
    fn test_to_column_values_follows_column_order() {
        let meta = EntityMetadata::of::<Item>().unwrap();
        let item = Item {
            item_id: None,
            label: "Alpha".into(),
            score: 10,
        };
        let values = meta.to_column_values(&item).unwrap();
        assert_eq!(
            values,
            vec![
                ("item_id".to_string(), Value::Null),
                ("name".to_string(), Value::Text("Alpha".into())),
                ("score".to_string(), Value::Integer(10)),
            ]
        );
        assert_eq!(meta.primary_key_value(&item).unwrap(), Value::Null);
    }

    #[test]
    fn test_from_row_maps_columns_to_attributes() {
        let meta = EntityMetadata::of::<Item>().unwrap();
        let row: Row = [
            ("item_id", Value::Integer(4)),
            ("name", Value::from("Delta")),
            ("score", Value::Integer(40)),
        ]
        .into_iter()
        .collect();
        let item: Item = meta.from_row(&row).unwrap();
        assert_eq!(
            item,
            Item {
                item_id: Some(4),
                label: "Delta".into(),
                score: 40
            }
        );
    }

    #[test]
    fn test_from_row_rejects_unmapped_and_mistyped_columns() {
        let meta = EntityMetadata::of::<Item>().unwrap();
        let row: Row = [("bogus", Value::Integer(1))].into_iter().collect();
        assert_eq!(
            meta.from_row::<Item>(&row).unwrap_err(),
            ConversionError::UnmappedColumn("bogus".into())
        );

        let row: Row = [
            ("item_id", Value::Integer(4)),
            ("name", Value::Integer(9)),
            ("score", Value::Integer(40)),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            meta.from_row::<Item>(&row).unwrap_err(),
            ConversionError::TypeMismatch { ref attribute, .. } if attribute == "label"
        ));
    }
}
