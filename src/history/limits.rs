//! Retention limits for the history store

use serde::{Deserialize, Serialize};

/// Default maximum number of stored conversations
pub const DEFAULT_MAX_CONVERSATIONS: usize = 50;
/// Default maximum messages kept per conversation
pub const DEFAULT_MAX_MESSAGES_PER_CONVERSATION: usize = 100;
/// Default serialized-size budget (4 MiB)
pub const DEFAULT_MAX_STORAGE_BYTES: usize = 4 * 1024 * 1024;
/// Default fraction of the budget above which cleanup is suggested
pub const DEFAULT_CLEANUP_THRESHOLD: f64 = 0.8;
/// Default age in days after which a conversation silently expires
pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;

/// Limits applied by every save
///
/// # Examples
///
/// ```
/// use chatkeep::history::HistoryLimits;
///
/// let limits = HistoryLimits::default();
/// assert_eq!(limits.max_conversations, 50);
/// assert_eq!(limits.cleanup_trigger_bytes(), 3_355_443);
///
/// let aggressive = limits.aggressive();
/// assert_eq!(aggressive.max_conversations, 25);
/// assert_eq!(aggressive.max_messages_per_conversation, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryLimits {
    /// Maximum number of conversations kept, most recent first
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,

    /// Maximum number of messages kept per conversation, most recent first
    #[serde(default = "default_max_messages")]
    pub max_messages_per_conversation: usize,

    /// Maximum size in bytes of the serialized snapshot
    #[serde(default = "default_max_storage_bytes")]
    pub max_storage_bytes: usize,

    /// Fraction of `max_storage_bytes` above which cleanup is suggested (0.0-1.0)
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold: f64,

    /// Conversations inactive for longer than this many days are dropped
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// When even the halved limits do not fit, keep only the newest
    /// conversation and cut its oldest messages until it does
    #[serde(default = "default_truncate_oversized")]
    pub truncate_oversized: bool,
}

fn default_max_conversations() -> usize {
    DEFAULT_MAX_CONVERSATIONS
}

fn default_max_messages() -> usize {
    DEFAULT_MAX_MESSAGES_PER_CONVERSATION
}

fn default_max_storage_bytes() -> usize {
    DEFAULT_MAX_STORAGE_BYTES
}

fn default_cleanup_threshold() -> f64 {
    DEFAULT_CLEANUP_THRESHOLD
}

fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

fn default_truncate_oversized() -> bool {
    true
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            max_messages_per_conversation: default_max_messages(),
            max_storage_bytes: default_max_storage_bytes(),
            cleanup_threshold: default_cleanup_threshold(),
            max_age_days: default_max_age_days(),
            truncate_oversized: default_truncate_oversized(),
        }
    }
}

impl HistoryLimits {
    /// The limits used by the fallback pass: count and message caps halved
    pub fn aggressive(&self) -> Self {
        Self {
            max_conversations: (self.max_conversations / 2).max(1),
            max_messages_per_conversation: (self.max_messages_per_conversation / 2).max(1),
            ..self.clone()
        }
    }

    /// Usage in bytes above which [`crate::history::HistoryManager::needs_cleanup`] is true
    pub fn cleanup_trigger_bytes(&self) -> usize {
        (self.max_storage_bytes as f64 * self.cleanup_threshold) as usize
    }

    /// Apply every field set in `update`
    pub fn apply(&mut self, update: &LimitsUpdate) {
        if let Some(v) = update.max_conversations {
            self.max_conversations = v;
        }
        if let Some(v) = update.max_messages_per_conversation {
            self.max_messages_per_conversation = v;
        }
        if let Some(v) = update.max_storage_bytes {
            self.max_storage_bytes = v;
        }
        if let Some(v) = update.cleanup_threshold {
            self.cleanup_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = update.max_age_days {
            self.max_age_days = v;
        }
        if let Some(v) = update.truncate_oversized {
            self.truncate_oversized = v;
        }
    }
}

/// Partial override of [`HistoryLimits`]; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsUpdate {
    /// New conversation count cap
    pub max_conversations: Option<usize>,
    /// New per-conversation message cap
    pub max_messages_per_conversation: Option<usize>,
    /// New byte budget
    pub max_storage_bytes: Option<usize>,
    /// New cleanup trigger ratio
    pub cleanup_threshold: Option<f64>,
    /// New expiry age in days
    pub max_age_days: Option<u32>,
    /// Toggle the single-conversation truncation pass
    pub truncate_oversized: Option<bool>,
}
