//! Single-file SQLite backend

use super::StorageBackend;
use crate::error::{ChatkeepError, Result};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

/// Backend storing keys in a `kv` table of a SQLite database file
pub struct SqliteBackend {
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Create a backend that uses the database at `db_path`
    ///
    /// The parent directory is created if needed and the schema initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatkeep::storage::{SqliteBackend, StorageBackend};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let backend = SqliteBackend::new_with_path(dir.path().join("history.db")).unwrap();
    /// assert_eq!(backend.name(), "sqlite");
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| ChatkeepError::Storage(e.to_string()))?;
        }

        let backend = Self { db_path };
        backend.init()?;
        Ok(backend)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .map_err(|e| ChatkeepError::Storage(format!("Failed to open database: {}", e)).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChatkeepError::Storage(format!("Failed to create tables: {}", e)))?;
        Ok(())
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| ChatkeepError::Storage(format!("Failed to query key: {}", e)))?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| ChatkeepError::Storage(format!("Failed to write key: {}", e)))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.connect()?;
        let affected = conn
            .execute("DELETE FROM kv WHERE key = ?", params![key])
            .map_err(|e| ChatkeepError::Storage(format!("Failed to delete key: {}", e)))?;
        Ok(affected > 0)
    }

    fn used_bytes(&self) -> Result<usize> {
        let conn = self.connect()?;
        let total: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                 FROM kv",
                [],
                |row| row.get(0),
            )
            .map_err(|e| ChatkeepError::Storage(format!("Failed to measure usage: {}", e)))?;
        Ok(usize::try_from(total).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Returns both the backend and the `TempDir` so the directory outlives
    /// the test body.
    fn create_test_backend() -> (SqliteBackend, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let backend =
            SqliteBackend::new_with_path(dir.path().join("history.db")).expect("open sqlite");
        (backend, dir)
    }

    #[test]
    fn test_init_creates_table() {
        let (backend, _dir) = create_test_backend();
        let conn = Connection::open(&backend.db_path).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='kv'",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_write_upserts() {
        let (backend, _dir) = create_test_backend();
        backend.write("k", "first").expect("write failed");
        backend.write("k", "second").expect("update failed");
        assert_eq!(backend.read("k").expect("read failed").as_deref(), Some("second"));
    }

    #[test]
    fn test_delete_reports_presence() {
        let (backend, _dir) = create_test_backend();
        backend.write("k", "v").expect("write failed");
        assert!(backend.delete("k").expect("delete failed"));
        assert!(!backend.delete("k").expect("second delete failed"));
        assert!(!backend.contains("k").expect("contains failed"));
    }

    #[test]
    fn test_used_bytes_is_byte_length() {
        let (backend, _dir) = create_test_backend();
        assert_eq!(backend.used_bytes().expect("measure failed"), 0);
        backend.write("k", "héllo").expect("write failed");
        assert_eq!(backend.used_bytes().expect("measure failed"), 1 + "héllo".len());
    }

    #[test]
    fn test_new_creates_nested_parent_directory() {
        let dir = tempdir().expect("failed to create tempdir");
        let db_path = dir.path().join("nested").join("history.db");
        let _backend = SqliteBackend::new_with_path(&db_path).expect("open sqlite");
        assert!(db_path.parent().unwrap().exists());
    }
}
