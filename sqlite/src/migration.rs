//! Versioned schema migrations and their tracking table.
//!
//! A [`MigrationManager`] records every applied [`Migration`] as one row of
//! a tracking table (`_migrations` by default). A migration is applied at
//! most once per name: applying an already recorded migration, or reverting
//! one that is not recorded, does nothing and reports `false`.
//!
//! Each apply or revert runs the migration's procedure together with the
//! tracking-table write inside a savepoint. If either fails, both are rolled
//! back and the original error is returned, so a record exists exactly when
//! `up` has run and `down` has not.
//!
//! # Example
//!
//! ```
//! use tinyorm_sqlite::{MigrationManager, SqlMigration, SqliteSession};
//!
//! let session = SqliteSession::open_in_memory().unwrap();
//! let manager = MigrationManager::new(&session);
//! manager.init().unwrap();
//!
//! let create = SqlMigration::new(
//!     "create_test_table",
//!     "1.0.0",
//!     "CREATE TABLE IF NOT EXISTS migration_test_tbl (id INTEGER)",
//!     "DROP TABLE IF EXISTS migration_test_tbl",
//! );
//! assert!(manager.apply_migration(&create).unwrap());
//! assert!(!manager.apply_migration(&create).unwrap());
//!
//! let applied = manager.get_applied_migrations().unwrap();
//! assert_eq!(applied[0].name, "create_test_table");
//! assert_eq!(applied[0].version, "1.0.0");
//!
//! assert!(manager.revert_migration(&create).unwrap());
//! assert!(manager.get_applied_migrations().unwrap().is_empty());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tinyorm_core::{FromValue, Row, Value};
use tracing::{info, warn};

use crate::convert::{format_timestamp, parse_timestamp};
use crate::error::{Result, StoreError};
use crate::schema::{generate_tracking_table_sql, validate_table_name};
use crate::session::Session;

/// Default name of the tracking table.
pub const DEFAULT_TRACKING_TABLE: &str = "_migrations";

const SAVEPOINT: &str = "tinyorm_migration";

/// A named, versioned schema change.
///
/// The name is the migration's identity; the version is recorded for
/// reference only.
pub trait Migration {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Applies the change.
    fn up(&self, session: &dyn Session) -> Result<()>;

    /// Undoes the change.
    fn down(&self, session: &dyn Session) -> Result<()>;
}

/// A migration defined by two SQL scripts.
///
/// Each script may hold several statements separated by `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    version: String,
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn up(&self, session: &dyn Session) -> Result<()> {
        session.execute_batch(&self.up_sql)
    }

    fn down(&self, session: &dyn Session) -> Result<()> {
        session.execute_batch(&self.down_sql)
    }
}

/// One row of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub name: String,
    pub version: String,
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    fn from_row(row: &Row) -> Result<Self> {
        let text = |column: &str| -> Result<String> {
            row.get(column)
                .and_then(String::from_value)
                .ok_or_else(|| {
                    StoreError::MigrationError(format!(
                        "tracking table row has no text '{column}' column"
                    ))
                })
        };
        Ok(Self {
            name: text("name")?,
            version: text("version")?,
            applied_at: parse_timestamp(&text("applied_at")?)?,
        })
    }
}

/// Applies and reverts migrations against one session.
pub struct MigrationManager<'s, S: Session> {
    session: &'s S,
    table: String,
}

impl<'s, S: Session> MigrationManager<'s, S> {
    /// Creates a manager using the default `_migrations` tracking table.
    ///
    /// Call [`init`](Self::init) before any other operation.
    pub fn new(session: &'s S) -> Self {
        Self {
            session,
            table: DEFAULT_TRACKING_TABLE.to_string(),
        }
    }

    /// Uses a different tracking table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConfigError`] if `table` is not a plain
    /// identifier.
    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        self.table = table;
        Ok(self)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Creates the tracking table if it does not exist.
    pub fn init(&self) -> Result<()> {
        self.session
            .execute_batch(&generate_tracking_table_sql(&self.table)?)?;
        info!(table = %self.table, "migration tracking table ready");
        Ok(())
    }

    /// Returns `true` if a migration with this name is recorded.
    pub fn is_applied(&self, name: &str) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE name = ? LIMIT 1", self.table);
        Ok(self
            .session
            .query_one(&sql, &[Value::from(name)])?
            .is_some())
    }

    /// Runs `up` and records the migration.
    ///
    /// Returns `false` without running anything if it is already recorded.
    pub fn apply_migration(&self, migration: &dyn Migration) -> Result<bool> {
        let name = migration.name();
        if self.is_applied(name)? {
            info!(migration = name, "migration already applied, skipping");
            return Ok(false);
        }

        self.in_savepoint(|| {
            migration.up(self.session)?;
            let sql = format!(
                "INSERT INTO {} (name, version, applied_at) VALUES (?, ?, ?)",
                self.table
            );
            self.session.execute(&sql, &[
                Value::from(name),
                Value::from(migration.version()),
                Value::from(format_timestamp(&Utc::now())),
            ])?;
            Ok(())
        })?;

        info!(migration = name, version = migration.version(), "applied migration");
        Ok(true)
    }

    /// Runs `down` and deletes the migration's record.
    ///
    /// Returns `false` without running anything if it is not recorded.
    pub fn revert_migration(&self, migration: &dyn Migration) -> Result<bool> {
        let name = migration.name();
        if !self.is_applied(name)? {
            info!(migration = name, "migration not applied, nothing to revert");
            return Ok(false);
        }

        self.in_savepoint(|| {
            migration.down(self.session)?;
            let sql = format!("DELETE FROM {} WHERE name = ?", self.table);
            self.session.execute(&sql, &[Value::from(name)])?;
            Ok(())
        })?;

        info!(migration = name, version = migration.version(), "reverted migration");
        Ok(true)
    }

    /// Applies each migration in list order and returns how many were newly
    /// applied. The first failure stops the batch; migrations applied before
    /// it stay applied.
    pub fn apply_migrations(&self, migrations: &[&dyn Migration]) -> Result<usize> {
        let mut applied = 0;
        for migration in migrations {
            if self.apply_migration(*migration)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Reverts each migration in list order and returns how many were
    /// reverted. The first failure stops the batch.
    pub fn revert_migrations(&self, migrations: &[&dyn Migration]) -> Result<usize> {
        let mut reverted = 0;
        for migration in migrations {
            if self.revert_migration(*migration)? {
                reverted += 1;
            }
        }
        Ok(reverted)
    }

    /// Lists recorded migrations, oldest first.
    pub fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT name, version, applied_at FROM {} ORDER BY applied_at, rowid",
            self.table
        );
        self.session
            .query(&sql, &[])?
            .iter()
            .map(MigrationRecord::from_row)
            .collect()
    }

    /// Names from `migrations` that are not yet applied, in list order.
    pub fn pending(&self, migrations: &[&dyn Migration]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for migration in migrations {
            if !self.is_applied(migration.name())? {
                out.push(migration.name().to_string());
            }
        }
        Ok(out)
    }

    fn in_savepoint(&self, work: impl FnOnce() -> Result<()>) -> Result<()> {
        self.session
            .execute_batch(&format!("SAVEPOINT {SAVEPOINT};"))?;
        match work() {
            Ok(()) => self
                .session
                .execute_batch(&format!("RELEASE SAVEPOINT {SAVEPOINT};")),
            Err(e) => {
                let rollback =
                    format!("ROLLBACK TO SAVEPOINT {SAVEPOINT}; RELEASE SAVEPOINT {SAVEPOINT};");
                if let Err(rollback_err) = self.session.execute_batch(&rollback) {
                    warn!(error = %rollback_err, "failed to roll back migration savepoint");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SqliteSession;

    fn create_test_table() -> SqlMigration {
        SqlMigration::new(
            "create_test_table",
            "1.0.0",
            "CREATE TABLE IF NOT EXISTS migration_test_tbl (id INTEGER)",
            "DROP TABLE IF EXISTS migration_test_tbl",
        )
    }

    fn second_migration() -> SqlMigration {
        SqlMigration::new(
            "second_migration",
            "2.0.0",
            "CREATE TABLE IF NOT EXISTS mig2_tbl (id INTEGER)",
            "DROP TABLE IF EXISTS mig2_tbl",
        )
    }

    /// Creates a table, then fails.
    struct Broken;

    impl Migration for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn up(&self, session: &dyn Session) -> Result<()> {
            session.execute_batch("CREATE TABLE half_done (id INTEGER)")?;
            Err(StoreError::MigrationError("boom".into()))
        }

        fn down(&self, _session: &dyn Session) -> Result<()> {
            Err(StoreError::MigrationError("cannot undo".into()))
        }
    }

    fn table_exists(session: &SqliteSession, table: &str) -> bool {
        session
            .query_one(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[Value::from(table)],
            )
            .unwrap()
            .is_some()
    }

    fn setup() -> SqliteSession {
        let session = SqliteSession::open_in_memory().unwrap();
        MigrationManager::new(&session).init().unwrap();
        session
    }

    #[test]
    fn test_initially_empty() {
        let session = setup();
        let manager = MigrationManager::new(&session);
        assert!(manager.get_applied_migrations().unwrap().is_empty());
        manager.init().unwrap();
    }

    #[test]
    fn test_apply_records_once() {
        let session = setup();
        let manager = MigrationManager::new(&session);
        let m = create_test_table();

        assert!(manager.apply_migration(&m).unwrap());
        assert!(table_exists(&session, "migration_test_tbl"));
        assert!(!manager.apply_migration(&m).unwrap());

        let applied = manager.get_applied_migrations().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].name, "create_test_table");
        assert_eq!(applied[0].version, "1.0.0");
    }

    #[test]
    fn test_revert_only_when_applied() {
        let session = setup();
        let manager = MigrationManager::new(&session);
        let m = create_test_table();

        assert!(!manager.revert_migration(&m).unwrap());
        manager.apply_migration(&m).unwrap();
        assert!(manager.revert_migration(&m).unwrap());
        assert!(!table_exists(&session, "migration_test_tbl"));
        assert!(!manager.is_applied("create_test_table").unwrap());
    }

    #[test]
    fn test_failed_up_leaves_no_trace() {
        let session = setup();
        let manager = MigrationManager::new(&session);

        let err = manager.apply_migration(&Broken).unwrap_err();
        assert!(matches!(err, StoreError::MigrationError(ref msg) if msg == "boom"));
        assert!(!manager.is_applied("broken").unwrap());
        assert!(!table_exists(&session, "half_done"));

        // The session is still usable afterwards.
        assert!(manager.apply_migration(&create_test_table()).unwrap());
    }

    #[test]
    fn test_failed_down_keeps_record() {
        let session = setup();
        let manager = MigrationManager::new(&session);
        session
            .execute(
                "INSERT INTO _migrations (name, version) VALUES (?, ?)",
                &[Value::from("broken"), Value::from("0.0.1")],
            )
            .unwrap();

        assert!(manager.revert_migration(&Broken).is_err());
        assert!(manager.is_applied("broken").unwrap());
    }

    #[test]
    fn test_batch_apply_and_revert() {
        let session = setup();
        let manager = MigrationManager::new(&session);
        let (a, b) = (create_test_table(), second_migration());
        let list: [&dyn Migration; 2] = [&a, &b];

        assert_eq!(manager.pending(&list).unwrap(), vec!["create_test_table", "second_migration"]);
        assert_eq!(manager.apply_migrations(&list).unwrap(), 2);
        assert_eq!(manager.apply_migrations(&list).unwrap(), 0);
        assert!(manager.pending(&list).unwrap().is_empty());

        let names: Vec<String> = manager
            .get_applied_migrations()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["create_test_table", "second_migration"]);

        assert_eq!(manager.revert_migrations(&list).unwrap(), 2);
        assert!(manager.get_applied_migrations().unwrap().is_empty());
    }

    #[test]
    fn test_batch_stops_at_first_failure() {
        let session = setup();
        let manager = MigrationManager::new(&session);
        let (a, b) = (create_test_table(), second_migration());
        let list: [&dyn Migration; 3] = [&a, &Broken, &b];

        assert!(manager.apply_migrations(&list).is_err());
        assert!(manager.is_applied("create_test_table").unwrap());
        assert!(!manager.is_applied("second_migration").unwrap());
    }

    #[test]
    fn test_custom_tracking_table() {
        let session = SqliteSession::open_in_memory().unwrap();
        let manager = MigrationManager::new(&session)
            .with_table("schema_history")
            .unwrap();
        manager.init().unwrap();
        manager.apply_migration(&create_test_table()).unwrap();
        assert!(table_exists(&session, "schema_history"));
        assert!(!table_exists(&session, DEFAULT_TRACKING_TABLE));

        assert!(MigrationManager::new(&session).with_table("bad name").is_err());
    }

    #[test]
    fn test_default_timestamp_rows_are_readable() {
        let session = setup();
        session
            .execute_batch("INSERT INTO _migrations (name, version) VALUES ('legacy', '0.1')")
            .unwrap();
        let applied = MigrationManager::new(&session).get_applied_migrations().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].name, "legacy");
    }
}
