//! Error types for Chatkeep
//!
//! This module defines the error types used by the ambient layers of the
//! crate (configuration, backends, orchestration), using `thiserror` for
//! ergonomic error handling.
//!
//! The history store and the request registry never surface these to their
//! callers: they convert failures into `false`, zero counts, or empty values
//! and emit a `tracing` diagnostic instead.

use thiserror::Error;

/// Main error type for Chatkeep operations
#[derive(Error, Debug)]
pub enum ChatkeepError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value backend errors (open, read, write, delete)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A write would push the backend over its byte quota
    #[error("Storage quota exceeded: used={used}, limit={limit}")]
    QuotaExceeded {
        /// Bytes the backend would hold after the write
        used: usize,
        /// The configured quota in bytes
        limit: usize,
    },

    /// No stored conversation has the requested id
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// An import payload had the wrong shape
    #[error("Invalid import: {0}")]
    InvalidImport(String),

    /// A pending request was cancelled before its result was applied
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// The chat backend failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Chatkeep operations
///
/// Uses `anyhow::Error` as the error type so call sites can attach context
/// while still downcasting to [`ChatkeepError`] where the variant matters.
pub type Result<T> = anyhow::Result<T>;
