//! DDL generation for entity tables and the migration tracking table.
//!
//! Entity tables are generated from validated [`EntityMetadata`], so every
//! table and column name is already a plain identifier. Column order in the
//! `CREATE TABLE` statement follows declaration order.
//!
//! An auto-increment primary key is always emitted as
//! `INTEGER PRIMARY KEY AUTOINCREMENT`: SQLite only generates keys for a
//! column declared exactly `INTEGER PRIMARY KEY`, whatever integer type the
//! entity declared.

use tinyorm_core::{ColumnSpec, EntityMetadata, is_valid_identifier};

use crate::error::{Result, StoreError};

/// Validates a table name that did not come from entity metadata.
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    if !is_valid_identifier(name) {
        return Err(StoreError::ConfigError(format!(
            "invalid table name '{name}': must contain only alphanumeric characters and underscores"
        )));
    }
    Ok(())
}

/// Renders one column definition.
pub(crate) fn column_definition(spec: &ColumnSpec) -> String {
    if spec.is_primary_key && spec.auto_increment {
        return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", spec.column_name);
    }

    let mut def = format!("{} {}", spec.column_name, spec.sql_type);
    if spec.is_primary_key {
        def.push_str(" PRIMARY KEY");
    }
    if spec.not_null {
        def.push_str(" NOT NULL");
    }
    def
}

/// Generates `CREATE TABLE IF NOT EXISTS` for an entity.
pub fn generate_create_table_sql(meta: &EntityMetadata) -> String {
    let columns: Vec<String> = meta
        .columns()
        .iter()
        .map(|c| format!("    {}", column_definition(c)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        meta.table_name(),
        columns.join(",\n")
    )
}

/// Generates `DROP TABLE IF EXISTS` for an entity.
pub fn generate_drop_table_sql(meta: &EntityMetadata) -> String {
    format!("DROP TABLE IF EXISTS {};", meta.table_name())
}

/// Generates the migration tracking table.
///
/// # Errors
///
/// Returns [`StoreError::ConfigError`] if `table` is not a plain identifier.
pub fn generate_tracking_table_sql(table: &str) -> Result<String> {
    validate_table_name(table)?;
    Ok(format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    name TEXT PRIMARY KEY NOT NULL,
    version TEXT NOT NULL,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#
    ))
}
