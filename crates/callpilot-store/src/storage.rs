//! String key/value storage on top of SQLite.

use crate::error::StoreError;
use crate::migrations::run_migrations;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Persistent string key/value store, the native counterpart of a
/// browser's `localStorage`.
#[derive(Debug)]
pub struct LocalStorage {
    conn: Connection,
}

impl LocalStorage {
    /// Opens (creating if needed) the storage file at `path` and brings its
    /// schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Self::with_connection(conn)
    }

    /// Opens a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let applied = run_migrations(&conn)?;
        if applied > 0 {
            tracing::debug!(count = applied, "applied local storage migrations");
        }
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO local_storage (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// Removes `key`. Removing a missing key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM local_storage WHERE key = ?1", [key])?;
        Ok(())
    }
}
