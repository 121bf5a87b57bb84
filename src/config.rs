//! Configuration management for Chatkeep
//!
//! Configuration is layered: a YAML file (or defaults when it is missing),
//! then `CHATKEEP_*` environment variables, then CLI overrides. Call
//! [`Config::validate`] after loading.

use crate::cli::Cli;
use crate::error::{ChatkeepError, Result};
use crate::history::HistoryLimits;
use crate::storage::BackendKind;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where and how the snapshot is persisted
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retention limits for stored conversations
    #[serde(default)]
    pub history: HistoryLimits,

    /// Request registry housekeeping
    #[serde(default)]
    pub requests: RequestConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend type (sled, sqlite, memory)
    #[serde(default)]
    pub backend: BackendKind,

    /// Database location; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Hard cap in bytes on everything the backend holds
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: usize,

    /// Key the conversation snapshot is stored under
    #[serde(default = "default_history_key")]
    pub key: String,
}

fn default_quota_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_history_key() -> String {
    crate::history::DEFAULT_HISTORY_KEY.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            path: None,
            quota_bytes: default_quota_bytes(),
            key: default_history_key(),
        }
    }
}

impl StorageConfig {
    /// The database path to open
    ///
    /// Uses `path` when set, otherwise `history.sled` or `history.db` inside
    /// the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Storage` if no data directory can be determined
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }

        let proj_dirs = ProjectDirs::from("com", "chatkeep", "chatkeep")
            .ok_or_else(|| ChatkeepError::Storage("Could not determine data directory".into()))?;

        let file_name = match self.backend {
            BackendKind::Sqlite => "history.db",
            _ => "history.sled",
        };
        Ok(proj_dirs.data_dir().join(file_name))
    }
}

/// Request registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Entries older than this are cancelled by the sweeper
    #[serde(default = "default_request_max_age")]
    pub max_age_seconds: u64,

    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_request_max_age() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: default_request_max_age(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl RequestConfig {
    /// Age after which a pending request is swept
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    /// Period between sweeps
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {}: {}", name, raw);
            None
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and a warning logged.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse a YAML configuration file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatkeepError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatkeepError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Storage overrides
        if let Some(backend) = env_parse::<BackendKind>("CHATKEEP_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(path) = std::env::var("CHATKEEP_STORAGE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }

        if let Some(quota) = env_parse("CHATKEEP_STORAGE_QUOTA_BYTES") {
            self.storage.quota_bytes = quota;
        }

        // History limit overrides
        if let Some(value) = env_parse("CHATKEEP_MAX_CONVERSATIONS") {
            self.history.max_conversations = value;
        }

        if let Some(value) = env_parse("CHATKEEP_MAX_MESSAGES") {
            self.history.max_messages_per_conversation = value;
        }

        if let Some(value) = env_parse("CHATKEEP_MAX_STORAGE_BYTES") {
            self.history.max_storage_bytes = value;
        }

        if let Some(value) = env_parse("CHATKEEP_CLEANUP_THRESHOLD") {
            self.history.cleanup_threshold = value;
        }

        if let Some(value) = env_parse("CHATKEEP_MAX_AGE_DAYS") {
            self.history.max_age_days = value;
        }

        // Request overrides
        if let Some(value) = env_parse("CHATKEEP_REQUEST_MAX_AGE_SECONDS") {
            self.requests.max_age_seconds = value;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(path) = &cli.storage_path {
            tracing::debug!("Using storage path override from CLI: {}", path.display());
            self.storage.path = Some(path.clone());
        }

        if let Some(backend) = cli.backend {
            tracing::debug!("Using storage backend override from CLI: {}", backend);
            self.storage.backend = backend;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any limit is zero or the cleanup threshold is out of range
    pub fn validate(&self) -> Result<()> {
        if self.history.max_conversations == 0 {
            return Err(ChatkeepError::Config(
                "history.max_conversations must be greater than 0".to_string(),
            )
            .into());
        }

        if self.history.max_messages_per_conversation == 0 {
            return Err(ChatkeepError::Config(
                "history.max_messages_per_conversation must be greater than 0".to_string(),
            )
            .into());
        }

        if self.history.max_storage_bytes == 0 {
            return Err(ChatkeepError::Config(
                "history.max_storage_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        if self.history.cleanup_threshold <= 0.0 || self.history.cleanup_threshold > 1.0 {
            return Err(ChatkeepError::Config(
                "history.cleanup_threshold must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        if self.storage.quota_bytes == 0 {
            return Err(
                ChatkeepError::Config("storage.quota_bytes must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.storage.key.is_empty() {
            return Err(ChatkeepError::Config("storage.key cannot be empty".to_string()).into());
        }

        if self.requests.max_age_seconds == 0 {
            return Err(ChatkeepError::Config(
                "requests.max_age_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.requests.sweep_interval_seconds == 0 {
            return Err(ChatkeepError::Config(
                "requests.sweep_interval_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.history.max_storage_bytes > self.storage.quota_bytes {
            tracing::warn!(
                "history.max_storage_bytes ({}) exceeds storage.quota_bytes ({}); saves near the budget may be refused",
                self.history.max_storage_bytes,
                self.storage.quota_bytes
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 9] = [
        "CHATKEEP_STORAGE_BACKEND",
        "CHATKEEP_STORAGE_PATH",
        "CHATKEEP_STORAGE_QUOTA_BYTES",
        "CHATKEEP_MAX_CONVERSATIONS",
        "CHATKEEP_MAX_MESSAGES",
        "CHATKEEP_MAX_STORAGE_BYTES",
        "CHATKEEP_CLEANUP_THRESHOLD",
        "CHATKEEP_MAX_AGE_DAYS",
        "CHATKEEP_REQUEST_MAX_AGE_SECONDS",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, BackendKind::Sled);
        assert_eq!(config.storage.quota_bytes, 5 * 1024 * 1024);
        assert_eq!(config.storage.key, "chat_history");
        assert_eq!(config.history.max_conversations, 50);
        assert_eq!(config.requests.max_age_seconds, 300);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_limits() {
        let mut config = Config::default();
        config.history.max_conversations = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.max_messages_per_conversation = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.max_storage_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.requests.max_age_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.requests.sweep_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_config_durations() {
        let requests = RequestConfig::default();
        assert_eq!(requests.max_age(), Duration::from_secs(300));
        assert_eq!(requests.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_validation_threshold_range() {
        let mut config = Config::default();
        config.history.cleanup_threshold = 0.0;
        assert!(config.validate().is_err());

        config.history.cleanup_threshold = 1.5;
        assert!(config.validate().is_err());

        config.history.cleanup_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml_with_partial_sections() {
        let yaml = r#"
storage:
  backend: sqlite
  path: /tmp/chatkeep-test.db
history:
  max_conversations: 10
  max_age_days: 7
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.backend, BackendKind::Sqlite);
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/chatkeep-test.db")));
        assert_eq!(config.storage.quota_bytes, default_quota_bytes());
        assert_eq!(config.history.max_conversations, 10);
        assert_eq!(config.history.max_age_days, 7);
        assert_eq!(config.history.max_messages_per_conversation, 100);
        assert_eq!(config.requests, RequestConfig::default());
    }

    #[test]
    fn test_shipped_config_parses() {
        let contents =
            std::fs::read_to_string("config/chatkeep.yaml").expect("Failed to read config/chatkeep.yaml");
        let config: Config = serde_yaml::from_str(&contents).expect("Failed to parse chatkeep.yaml");
        assert!(config.validate().is_ok());
        assert_eq!(config.history, HistoryLimits::default());
        assert_eq!(config.storage, StorageConfig::default());
        assert_eq!(config.requests, RequestConfig::default());
    }

    #[test]
    fn test_parse_yaml_rejects_unknown_backend() {
        let result: std::result::Result<Config, _> = serde_yaml::from_str("storage:\n  backend: redis\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_resolved_path_prefers_explicit_path() {
        let config = StorageConfig {
            path: Some(PathBuf::from("/data/chat.sled")),
            ..StorageConfig::default()
        };
        assert_eq!(config.resolved_path().unwrap(), PathBuf::from("/data/chat.sled"));
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "history: [not, a, map]").unwrap();
        let err = Config::from_file(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        clear_env();
        let cli = Cli::default();
        let config = Config::load("does/not/exist.yaml", &cli).unwrap();
        assert_eq!(config.history, HistoryLimits::default());
    }

    #[test]
    #[serial]
    fn test_env_vars_override_file_values() {
        clear_env();
        std::env::set_var("CHATKEEP_STORAGE_BACKEND", "memory");
        std::env::set_var("CHATKEEP_MAX_CONVERSATIONS", "7");
        std::env::set_var("CHATKEEP_CLEANUP_THRESHOLD", "0.5");
        std::env::set_var("CHATKEEP_REQUEST_MAX_AGE_SECONDS", "30");

        let mut config = Config::default();
        config.apply_env_vars();
        clear_env();

        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.history.max_conversations, 7);
        assert_eq!(config.history.cleanup_threshold, 0.5);
        assert_eq!(config.requests.max_age_seconds, 30);
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_ignored() {
        clear_env();
        std::env::set_var("CHATKEEP_MAX_MESSAGES", "lots");
        std::env::set_var("CHATKEEP_STORAGE_BACKEND", "redis");

        let mut config = Config::default();
        config.apply_env_vars();
        clear_env();

        assert_eq!(config.history.max_messages_per_conversation, 100);
        assert_eq!(config.storage.backend, BackendKind::Sled);
    }

    #[test]
    #[serial]
    fn test_cli_overrides_win_over_env() {
        clear_env();
        std::env::set_var("CHATKEEP_STORAGE_BACKEND", "sqlite");

        let cli = Cli {
            storage_path: Some(PathBuf::from("/tmp/override.sled")),
            backend: Some(BackendKind::Memory),
            ..Cli::default()
        };
        let config = Config::load("does/not/exist.yaml", &cli).unwrap();
        clear_env();

        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/override.sled")));
    }
}
