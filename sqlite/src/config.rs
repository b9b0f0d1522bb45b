//! Connection configuration.
//!
//! Describes where a database lives and how its session is set up. The
//! configuration is serde-serializable and can be kept in a YAML file next
//! to the application.
//!
//! # Example YAML
//!
//! ```yaml
//! name: mydb
//! location: file
//! path: my_database.db
//! foreign_keys: true
//! busy_timeout_ms: 5000
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::session::SqliteSession;

/// Where the database is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbLocation {
    /// Private in-memory database, discarded when the session closes (the
    /// default).
    #[default]
    Memory,
    /// File-backed database at [`DbConfig::path`].
    File,
}

fn default_foreign_keys() -> bool {
    true
}

/// Settings for opening a [`SqliteSession`].
///
/// # Examples
///
/// ```
/// use tinyorm_sqlite::{DbConfig, DbLocation};
///
/// let config = DbConfig::memory("scratch");
/// assert_eq!(config.location, DbLocation::Memory);
/// let session = config.open().unwrap();
/// assert_eq!(session.name(), "scratch");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Logical name, used in log output.
    pub name: String,
    #[serde(default)]
    pub location: DbLocation,
    /// Database file; required when `location` is `file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Whether to enforce foreign-key constraints (`PRAGMA foreign_keys`).
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
    /// How long a statement waits on a locked database before failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
}

impl DbConfig {
    /// In-memory database configuration.
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: DbLocation::Memory,
            path: None,
            foreign_keys: true,
            busy_timeout_ms: None,
        }
    }

    /// File-backed database configuration.
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            location: DbLocation::File,
            path: Some(path.into()),
            ..Self::memory(name)
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](StoreError::IoError) if the file cannot be read,
    /// [`YamlError`](StoreError::YamlError) if parsing fails, or
    /// [`ConfigError`](StoreError::ConfigError) if the settings are
    /// inconsistent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks that the settings describe an openable database.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::ConfigError("name cannot be empty".into()));
        }
        if self.location == DbLocation::File && self.path.is_none() {
            return Err(StoreError::ConfigError(format!(
                "database '{}' is file-backed but has no path",
                self.name
            )));
        }
        Ok(())
    }

    /// Opens a session according to this configuration.
    pub fn open(&self) -> Result<SqliteSession> {
        self.validate()?;
        let conn = match (&self.location, &self.path) {
            (DbLocation::File, Some(path)) => {
                info!(name = %self.name, "opening database at {}", path.display());
                Connection::open(path)?
            }
            _ => {
                info!(name = %self.name, "opening in-memory database");
                Connection::open_in_memory()?
            }
        };

        let foreign_keys = if self.foreign_keys { "ON" } else { "OFF" };
        conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
        if let Some(ms) = self.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }

        Ok(SqliteSession::from_connection(conn, self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use tinyorm_core::Value;

    fn sample_yaml() -> &'static str {
        r#"
name: mydb
location: file
path: my_database.db
foreign_keys: false
busy_timeout_ms: 250
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config: DbConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.name, "mydb");
        assert_eq!(config.location, DbLocation::File);
        assert_eq!(config.path, Some(PathBuf::from("my_database.db")));
        assert!(!config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, Some(250));
    }

    #[test]
    fn test_deserialize_minimal_uses_defaults() {
        let config: DbConfig = serde_yaml::from_str("name: scratch\n").unwrap();
        assert_eq!(config, DbConfig::memory("scratch"));
    }

    #[test]
    fn test_validate() {
        assert!(DbConfig::memory("ok").validate().is_ok());
        assert!(DbConfig::memory("  ").validate().is_err());

        let mut config = DbConfig::file("f", "x.db");
        assert!(config.validate().is_ok());
        config.path = None;
        assert!(matches!(config.validate(), Err(StoreError::ConfigError(_))));
    }

    #[test]
    fn test_with_busy_timeout() {
        let config = DbConfig::memory("m").with_busy_timeout(Duration::from_secs(2));
        assert_eq!(config.busy_timeout_ms, Some(2000));
    }

    #[test]
    fn test_open_applies_foreign_keys_pragma() {
        let session = DbConfig::memory("fk").open().unwrap();
        let row = session.query_one("PRAGMA foreign_keys", &[]).unwrap().unwrap();
        assert_eq!(row.get_index(0), Some(&Value::Integer(1)));

        let mut config = DbConfig::memory("nofk");
        config.foreign_keys = false;
        let session = config.open().unwrap();
        let row = session.query_one("PRAGMA foreign_keys", &[]).unwrap().unwrap();
        assert_eq!(row.get_index(0), Some(&Value::Integer(0)));
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yml");

        let original = DbConfig::file("mydb", dir.path().join("data.db"))
            .with_busy_timeout(Duration::from_millis(100));
        original.save(&path).unwrap();

        let loaded = DbConfig::load(&path).unwrap();
        assert_eq!(loaded, original);
    }
}
