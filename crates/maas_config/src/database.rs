//! SQLite backend.
//!
//! Each option is one row in a `configuration` table, its value stored as
//! JSON text. Isolation between concurrent openers is left to SQLite's own
//! locking; no application-level lock is taken. Each open holds SQLite's
//! write lock for its whole block, so a second opener waits up to
//! [`LOCK_TIMEOUT`] for the first to finish.

use crate::error::{ConfigError, Result};
use crate::lock::LOCK_TIMEOUT;
use crate::paths::touch;
use crate::store::{Backend, Store};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS configuration \
                      (id INTEGER PRIMARY KEY, \
                       name TEXT NOT NULL UNIQUE, \
                       data BLOB)";

/// A configuration table inside an open SQLite connection.
pub struct ConfigurationDatabase {
    conn: Connection,
}

impl ConfigurationDatabase {
    /// Wrap `conn`, creating the configuration table if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Get the underlying connection (escape hatch for tests and tooling).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Store for ConfigurationDatabase {
    fn get(&self, name: &str) -> Result<Value> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM configuration WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Err(ConfigError::key_not_found(name)),
        }
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let data = serde_json::to_string(&value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO configuration (name, data) VALUES (?1, ?2)",
            params![name, data],
        )?;
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM configuration WHERE name = ?1", params![name])?;
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM configuration")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}

/// Backend storing configuration in an SQLite database.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseBackend;

impl Backend for DatabaseBackend {
    type Store = ConfigurationDatabase;

    fn open<R, E, F>(path: &Path, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Self::Store) -> std::result::Result<R, E>,
        E: From<ConfigError>,
    {
        touch(path)?;
        let conn = Connection::open(path).map_err(ConfigError::from)?;
        conn.busy_timeout(LOCK_TIMEOUT).map_err(ConfigError::from)?;
        let mut db = ConfigurationDatabase::new(conn)?;
        info!(path = %path.display(), "Configuration database opened");

        // Everything done by `f` is one transaction. IMMEDIATE takes the
        // write lock now: a deferred read lock cannot be upgraded while
        // another opener holds one. Dropping the connection without COMMIT
        // rolls it back.
        db.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(ConfigError::from)?;
        let result = f(&mut db)?;
        db.conn.execute_batch("COMMIT").map_err(ConfigError::from)?;
        debug!(path = %path.display(), "Configuration database committed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open<R>(
        path: &Path,
        f: impl FnOnce(&mut ConfigurationDatabase) -> Result<R>,
    ) -> Result<R> {
        DatabaseBackend::open(path, f)
    }

    #[test]
    fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.db");

        let names = open(&path, |db| db.names()).unwrap();
        assert!(names.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_set_get_remove() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.db");

        open(&path, |db| {
            db.set("alice", json!({"a": [1, "two", null]}))?;
            assert_eq!(db.get("alice")?, json!({"a": [1, "two", null]}));
            db.remove("alice")?;
            db.remove("never-there")?;
            assert!(db.get("alice").unwrap_err().is_key_not_found());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_upsert_keeps_one_row() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.db");

        open(&path, |db| {
            db.set("x", json!("first"))?;
            db.set("x", json!("second"))
        })
        .unwrap();

        let (value, rows) = open(&path, |db| {
            let rows: i64 = db.connection().query_row(
                "SELECT COUNT(*) FROM configuration WHERE name = 'x'",
                [],
                |row| row.get(0),
            )?;
            Ok((db.get("x")?, rows))
        })
        .unwrap();
        assert_eq!(value, json!("second"));
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_error_in_block_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.db");

        open(&path, |db| db.set("kept", json!(1))).unwrap();

        let result: Result<()> = open(&path, |db| {
            db.set("kept", json!(2))?;
            db.set("lost", json!(3))?;
            Err(ConfigError::invalid("simulated failure"))
        });
        assert!(result.is_err());

        let (kept, names) = open(&path, |db| Ok((db.get("kept")?, db.names()?))).unwrap();
        assert_eq!(kept, json!(1));
        assert_eq!(names, vec!["kept".to_string()]);
    }

    #[test]
    fn test_values_stored_as_json_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.db");

        open(&path, |db| db.set("port", json!(5069))).unwrap();

        let conn = Connection::open(&path).unwrap();
        let data: String = conn
            .query_row(
                "SELECT data FROM configuration WHERE name = 'port'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(data, "5069");
    }
}
