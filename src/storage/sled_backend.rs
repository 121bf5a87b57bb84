//! Embedded `sled` backend

use super::StorageBackend;
use crate::error::{ChatkeepError, Result};
use sled::Db;
use std::path::Path;

/// Backend persisting keys in an embedded `sled` database
///
/// Every write and delete is flushed before returning.
pub struct SledBackend {
    db: Db,
}

impl SledBackend {
    /// Open or create a database at `path`
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use chatkeep::storage::SledBackend;
    ///
    /// # fn main() -> chatkeep::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let backend = SledBackend::new(dir.path().join("history.sled"))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ChatkeepError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ChatkeepError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

impl StorageBackend for SledBackend {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| ChatkeepError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let value = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    ChatkeepError::Storage(format!("Stored value is not UTF-8: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| ChatkeepError::Storage(format!("Insert failed: {}", e)))?;
        self.flush()
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let removed = self
            .db
            .remove(key.as_bytes())
            .map_err(|e| ChatkeepError::Storage(format!("Remove failed: {}", e)))?;
        self.flush()?;
        Ok(removed.is_some())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        self.db
            .contains_key(key.as_bytes())
            .map_err(|e| ChatkeepError::Storage(format!("Lookup failed: {}", e)).into())
    }

    fn used_bytes(&self) -> Result<usize> {
        let mut total = 0;
        for result in self.db.iter() {
            let (key, value) =
                result.map_err(|e| ChatkeepError::Storage(format!("Iteration failed: {}", e)))?;
            total += key.len() + value.len();
        }
        Ok(total)
    }
}
