//! JSON export of entity tables.
//!
//! Each row becomes one JSON object keyed by column name. Integers, reals,
//! text, booleans, and `NULL` map onto their JSON counterparts. Repository
//! exports go through each entity's attributes, so `BOOLEAN` columns come
//! out as `true`/`false` even though SQLite stores them as `0`/`1`.

use std::io::Write;

use serde_json::{Map, Value as JsonValue};
use tinyorm_core::{Entity, EntityMetadata, Row};
use tracing::debug;

use crate::error::Result;
use crate::repository::Repository;
use crate::session::Session;

/// Converts result rows into a JSON array of objects.
pub fn rows_to_json(rows: &[Row]) -> Result<JsonValue> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut object = Map::new();
        for (column, value) in row.iter() {
            object.insert(column.to_string(), serde_json::to_value(value)?);
        }
        out.push(JsonValue::Object(object));
    }
    Ok(JsonValue::Array(out))
}

/// Converts entities into a JSON array of objects keyed by column name.
pub fn entities_to_json<E: Entity>(meta: &EntityMetadata, entities: &[E]) -> Result<JsonValue> {
    let rows = entities
        .iter()
        .map(|e| Ok(meta.to_column_values(e)?.into_iter().collect::<Row>()))
        .collect::<Result<Vec<Row>>>()?;
    rows_to_json(&rows)
}

impl<E: Entity, S: Session + ?Sized> Repository<'_, E, S> {
    /// Exports every row, ordered by primary key, as a JSON array.
    pub fn to_json_value(&self) -> Result<JsonValue> {
        let entities = self.find_all()?;
        debug!(table = self.table_name(), rows = entities.len(), "exporting to JSON");
        entities_to_json(self.metadata(), &entities)
    }

    /// Exports every row as pretty-printed JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json_value()?)?)
    }

    /// Writes every row as pretty-printed JSON.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.to_json_value()?)?;
        Ok(())
    }
}
