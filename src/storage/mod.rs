//! Persistent key-value substrate
//!
//! A small get/set/remove abstraction over a synchronous, size-limited local
//! store. Backends implement the fallible [`StorageBackend`] trait; callers go
//! through [`LocalStore`], which enforces the byte quota and never lets an
//! error escape: failures become `None`/`false` plus a `tracing` diagnostic.

use crate::config::StorageConfig;
use crate::error::{ChatkeepError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

pub mod memory;
pub mod sled_backend;
pub mod sqlite_backend;

pub use memory::MemoryBackend;
pub use sled_backend::SledBackend;
pub use sqlite_backend::SqliteBackend;

/// Raw, fallible operations a key-value backend must provide
///
/// Values are UTF-8 text. Every operation is synchronous.
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in diagnostics
    fn name(&self) -> &'static str;

    /// Read the value stored under `key`
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`, returning whether it was present
    fn delete(&self, key: &str) -> Result<bool>;

    /// Whether `key` is present
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.read(key)?.is_some())
    }

    /// Total bytes held by the backend (key bytes plus value bytes)
    fn used_bytes(&self) -> Result<usize>;
}

/// Which backend a [`LocalStore`] is opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded `sled` database
    #[default]
    Sled,
    /// Single-file SQLite database
    Sqlite,
    /// Process memory only; nothing survives a restart
    Memory,
}

impl BackendKind {
    /// Lowercase name as accepted in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sled => "sled",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ChatkeepError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sled" => Ok(BackendKind::Sled),
            "sqlite" => Ok(BackendKind::Sqlite),
            "memory" => Ok(BackendKind::Memory),
            other => Err(ChatkeepError::Config(format!(
                "Invalid storage backend: {}. Must be one of: sled, sqlite, memory",
                other
            ))),
        }
    }
}

/// Open the backend described by `config`
///
/// # Errors
///
/// Returns `ChatkeepError::Storage` if the data directory cannot be resolved
/// or the database cannot be opened.
pub fn open_backend(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    let backend: Box<dyn StorageBackend> = match config.backend {
        BackendKind::Memory => Box::new(MemoryBackend::new()),
        BackendKind::Sled => Box::new(SledBackend::new(config.resolved_path()?)?),
        BackendKind::Sqlite => Box::new(SqliteBackend::new_with_path(config.resolved_path()?)?),
    };
    tracing::debug!(backend = backend.name(), "Opened storage backend");
    Ok(backend)
}

/// Quota-enforcing, non-throwing front end over a [`StorageBackend`]
///
/// # Examples
///
/// ```
/// use chatkeep::storage::LocalStore;
///
/// let store = LocalStore::in_memory().with_quota(64);
/// assert!(store.set("greeting", "hello"));
/// assert_eq!(store.get("greeting").as_deref(), Some("hello"));
/// assert!(!store.set("big", &"x".repeat(100)));
/// assert!(!store.has("big"));
/// ```
pub struct LocalStore {
    backend: Box<dyn StorageBackend>,
    quota_bytes: Option<usize>,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Wrap an already opened backend with no quota
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            quota_bytes: None,
            write_lock: Mutex::new(()),
        }
    }

    /// A store backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    /// Open the configured backend and apply the configured quota
    pub fn open(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(open_backend(config)?).with_quota(config.quota_bytes))
    }

    /// Refuse writes that would take total usage above `quota_bytes`
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// The configured quota, if any
    pub fn quota_bytes(&self) -> Option<usize> {
        self.quota_bytes
    }

    /// Name of the underlying backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Read a raw value; `None` when absent or unreadable
    pub fn get(&self, key: &str) -> Option<String> {
        match self.backend.read(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, backend = self.backend.name(), error = %e, "Storage read failed");
                None
            }
        }
    }

    /// Write a raw value; `false` when refused by the quota or the backend
    ///
    /// A refused write leaves the previous value in place.
    pub fn set(&self, key: &str, value: &str) -> bool {
        match self.try_set(key, value) {
            Ok(()) => true,
            Err(e) => {
                if let Some(ChatkeepError::QuotaExceeded { used, limit }) =
                    e.downcast_ref::<ChatkeepError>()
                {
                    tracing::warn!(key, bytes = used, limit, "Storage quota exceeded; write refused");
                } else {
                    tracing::error!(key, backend = self.backend.name(), error = %e, "Storage write failed");
                }
                false
            }
        }
    }

    fn try_set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(limit) = self.quota_bytes {
            let current = self.backend.used_bytes()?;
            let replaced = self
                .backend
                .read(key)?
                .map(|old| key.len() + old.len())
                .unwrap_or(0);
            let projected = current.saturating_sub(replaced) + key.len() + value.len();
            if projected > limit {
                return Err(ChatkeepError::QuotaExceeded {
                    used: projected,
                    limit,
                }
                .into());
            }
        }

        self.backend.write(key, value)
    }

    /// Remove a key; `false` only when the backend fails
    pub fn remove(&self, key: &str) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.backend.delete(key) {
            Ok(existed) => {
                tracing::debug!(key, existed, "Removed storage key");
                true
            }
            Err(e) => {
                tracing::error!(key, backend = self.backend.name(), error = %e, "Storage delete failed");
                false
            }
        }
    }

    /// Whether a key is present; `false` when the backend fails
    pub fn has(&self, key: &str) -> bool {
        self.backend.contains(key).unwrap_or_else(|e| {
            tracing::error!(key, backend = self.backend.name(), error = %e, "Storage lookup failed");
            false
        })
    }

    /// Read and deserialize a JSON value
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Stored value is not valid JSON for the requested type");
                None
            }
        }
    }

    /// Serialize and write a JSON value
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw),
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to serialize value for storage");
                false
            }
        }
    }

    /// Bytes currently held by the backend; zero when unknown
    pub fn used_bytes(&self) -> usize {
        self.backend.used_bytes().unwrap_or_else(|e| {
            tracing::error!(backend = self.backend.name(), error = %e, "Failed to measure storage usage");
            0
        })
    }
}

impl fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("backend", &self.backend.name())
            .field("quota_bytes", &self.quota_bytes)
            .finish()
    }
}
