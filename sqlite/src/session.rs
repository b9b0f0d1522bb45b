//! The database session abstraction and its SQLite implementation.
//!
//! Repositories and migration managers only ever talk to a [`Session`]:
//! SQL text plus an ordered slice of values bound to positional `?`
//! placeholders. A session runs one statement at a time; callers sharing a
//! session across threads must synchronize externally.

use std::path::Path;

use rusqlite::{CachedStatement, Connection, Statement, params_from_iter};
use tinyorm_core::{Row, Value};
use tracing::{debug, info};

use crate::convert::{read_row, to_sql_value};
use crate::error::{Result, StoreError};

/// A live connection able to run parameterized SQL.
///
/// Parameters are always positional. Errors from the engine are returned
/// unchanged; this layer adds no retries.
pub trait Session {
    /// Runs a statement and returns the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Runs one or more parameterless statements separated by `;`.
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Runs a query and collects every row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Runs a query and returns its first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Closes the session, reporting any error from the engine.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// [`Session`] over a single `rusqlite` connection.
///
/// # Examples
///
/// ```
/// use tinyorm_core::Value;
/// use tinyorm_sqlite::{Session, SqliteSession};
///
/// let session = SqliteSession::open_in_memory().unwrap();
/// session.execute_batch("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
/// session
///     .execute("INSERT INTO t VALUES (?, ?)", &[Value::from(1), Value::from("a")])
///     .unwrap();
///
/// let row = session.query_one("SELECT name FROM t WHERE id = ?", &[Value::from(1)]).unwrap();
/// assert_eq!(row.unwrap().get("name"), Some(&Value::from("a")));
///
/// // Named parameters are refused.
/// assert!(session.query("SELECT * FROM t WHERE id = :id", &[Value::from(1)]).is_err());
/// ```
pub struct SqliteSession {
    conn: Connection,
    name: String,
}

impl SqliteSession {
    /// Opens a private in-memory database with foreign keys enforced.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self::from_connection(conn, "memory"))
    }

    /// Opens (or creates) a file-backed database with foreign keys enforced.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self::from_connection(conn, path.display().to_string()))
    }

    /// Wraps an already configured connection.
    pub fn from_connection(conn: Connection, name: impl Into<String>) -> Self {
        Self {
            conn,
            name: name.into(),
        }
    }

    /// Label used in log output (the config name or the file path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the session and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn prepare(&self, sql: &str, params: &[Value]) -> Result<CachedStatement<'_>> {
        let stmt = self.conn.prepare_cached(sql)?;
        check_parameters(&stmt, params.len())?;
        Ok(stmt)
    }
}

/// Rejects named parameters and placeholder/value count mismatches.
///
/// SQLite reports a name for `:x`, `@x`, `$x`, and `?NNN` parameters and
/// none for a bare `?`.
fn check_parameters(stmt: &Statement<'_>, supplied: usize) -> Result<()> {
    let expected = stmt.parameter_count();
    for index in 1..=expected {
        if let Some(name) = stmt.parameter_name(index) {
            return Err(StoreError::NamedParameter(name.to_string()));
        }
    }
    if expected != supplied {
        return Err(StoreError::ParameterCount {
            expected,
            actual: supplied,
        });
    }
    Ok(())
}

impl Session for SqliteSession {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        debug!(session = %self.name, sql, params = params.len(), "execute");
        let mut stmt = self.prepare(sql, params)?;
        let affected = stmt.execute(params_from_iter(params.iter().map(to_sql_value)))?;
        Ok(affected)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        debug!(session = %self.name, sql, "execute batch");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        debug!(session = %self.name, sql, params = params.len(), "query");
        let mut stmt = self.prepare(sql, params)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql_value)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(row, &columns)?);
        }
        Ok(out)
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        debug!(session = %self.name, sql, params = params.len(), "query one");
        let mut stmt = self.prepare(sql, params)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql_value)))?;

        match rows.next()? {
            Some(row) => Ok(Some(read_row(row, &columns)?)),
            None => Ok(None),
        }
    }

    fn close(self) -> Result<()> {
        info!(session = %self.name, "closing database session");
        self.conn.close().map_err(|(_, e)| StoreError::DatabaseError(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_table() -> SqliteSession {
        let session = SqliteSession::open_in_memory().unwrap();
        session
            .execute_batch(
                "CREATE TABLE t (id INTEGER, name TEXT);
                 INSERT INTO t VALUES (1, 'A'), (2, 'B'), (3, 'C');",
            )
            .unwrap();
        session
    }

    #[test]
    fn test_execute_returns_affected_rows() {
        let session = session_with_table();
        let n = session
            .execute("UPDATE t SET name = ? WHERE id >= ?", &[Value::from("Z"), Value::from(2)])
            .unwrap();
        assert_eq!(n, 2);
        let n = session
            .execute("DELETE FROM t WHERE id = ?", &[Value::from(99)])
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_query_returns_named_columns() {
        let session = session_with_table();
        let rows = session
            .query("SELECT id, name FROM t WHERE id IN (?, ?) ORDER BY id", &[
                Value::from(1),
                Value::from(3),
            ])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));
        assert_eq!(rows[1].get("name"), Some(&Value::from("C")));
    }

    #[test]
    fn test_query_one_absent_is_none() {
        let session = session_with_table();
        let row = session
            .query_one("SELECT id FROM t WHERE id = ?", &[Value::from(42)])
            .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_named_parameters_are_rejected() {
        let session = session_with_table();
        for sql in [
            "SELECT * FROM t WHERE id = :id",
            "SELECT * FROM t WHERE id = @id",
            "SELECT * FROM t WHERE id = $id",
            "SELECT * FROM t WHERE id = ?1",
        ] {
            let err = session.query(sql, &[Value::from(1)]).unwrap_err();
            assert!(matches!(err, StoreError::NamedParameter(_)), "{sql}: {err}");
        }
    }

    #[test]
    fn test_parameter_count_mismatch_is_rejected() {
        let session = session_with_table();
        let err = session
            .execute("DELETE FROM t WHERE id = ? OR id = ?", &[Value::from(1)])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ParameterCount {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_sql_errors_propagate() {
        let session = session_with_table();
        let err = session.query("SELEC nonsense", &[]).unwrap_err();
        assert!(matches!(err, StoreError::DatabaseError(_)));
    }

    #[test]
    fn test_close() {
        let session = session_with_table();
        session.close().unwrap();
    }
}
