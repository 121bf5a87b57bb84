//! Bounded conversation store
//!
//! [`HistoryManager`] persists the full set of conversations as one snapshot
//! under a single key of a [`LocalStore`], keeping its serialized size within
//! a byte budget. Every save runs the same deterministic pipeline:
//!
//! 1. drop unfinished placeholder messages
//! 2. drop conversations inactive for longer than `max_age_days`
//! 3. sort by last activity, newest first
//! 4. keep the newest `max_conversations`
//! 5. keep the newest `max_messages_per_conversation` messages of each
//! 6. serialize and measure; if over budget, repeat 4-5 with halved caps
//! 7. if still over budget and `truncate_oversized` is set, keep only the
//!    newest conversation and as many of its newest messages as fit
//!
//! A save that cannot fit writes nothing, so the previous snapshot survives.
//! No operation here returns an error: failures become `false`, empty
//! collections, or zeroed reports, with the cause logged through `tracing`.

use crate::config::Config;
use crate::error::{ChatkeepError, Result};
use crate::storage::LocalStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

pub mod limits;
pub mod snapshot;
pub mod types;

pub use limits::{HistoryLimits, LimitsUpdate};
pub use snapshot::{format_bytes, StorageSnapshot, SNAPSHOT_VERSION};
pub use types::{
    new_conversation_id, new_message_id, Conversation, ConversationSummary, Message, Role, Source,
};

use snapshot::{decode_snapshot, encode_snapshot};

/// Key the snapshot is stored under unless configured otherwise
pub const DEFAULT_HISTORY_KEY: &str = "chat_history";

/// Fraction of conversations removed by [`HistoryManager::perform_cleanup`]
const CLEANUP_REMOVE_RATIO: f64 = 0.2;

/// Owner of the persisted conversation snapshot
///
/// All read-modify-write sequences are serialized by an internal mutex, so
/// concurrent `save_conversation`/`delete_conversation` calls from several
/// threads never lose each other's updates.
///
/// # Examples
///
/// ```
/// use chatkeep::history::{Conversation, HistoryLimits, HistoryManager, Message};
/// use chatkeep::storage::LocalStore;
///
/// let manager = HistoryManager::new(LocalStore::in_memory(), HistoryLimits::default());
///
/// let mut conversation = Conversation::new("Quarterly report");
/// conversation.push_message(Message::user("Summarize Q3"));
/// assert!(manager.save_conversation(conversation.clone()));
///
/// let loaded = manager.load();
/// assert_eq!(loaded, vec![conversation]);
/// ```
pub struct HistoryManager {
    store: LocalStore,
    key: String,
    limits: RwLock<HistoryLimits>,
    write_lock: Mutex<()>,
}

impl HistoryManager {
    /// Create a manager over `store` using the default key
    pub fn new(store: LocalStore, limits: HistoryLimits) -> Self {
        Self {
            store,
            key: DEFAULT_HISTORY_KEY.to_string(),
            limits: RwLock::new(limits),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the configured backend and build a manager from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be opened
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = LocalStore::open(&config.storage)?;
        Ok(Self::new(store, config.history.clone()).with_key(config.storage.key.clone()))
    }

    /// Store the snapshot under `key` instead of the default
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// The storage key holding the snapshot
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The underlying key-value store
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Current limits
    pub fn limits(&self) -> HistoryLimits {
        self.limits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Override some or all limits, returning the resulting set
    ///
    /// New limits apply from the next save; the stored snapshot is not
    /// rewritten.
    pub fn update_limits(&self, update: LimitsUpdate) -> HistoryLimits {
        let mut limits = self.limits.write().unwrap_or_else(PoisonError::into_inner);
        limits.apply(&update);
        tracing::debug!(?limits, "Updated history limits");
        limits.clone()
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist `conversations` as the complete snapshot
    ///
    /// Returns `false` when the set cannot be made to fit the budget or the
    /// backend refuses the write; the previous snapshot is then unchanged.
    pub fn save(&self, conversations: Vec<Conversation>) -> bool {
        let _guard = self.lock_writes();
        self.save_unlocked(conversations)
    }

    fn save_unlocked(&self, conversations: Vec<Conversation>) -> bool {
        let limits = self.limits();
        let serialized = match fit_to_budget(conversations, &limits, Utc::now()) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(error = %e, "History does not fit the storage budget; keeping previous snapshot");
                return false;
            }
        };

        if self.store.set(&self.key, &serialized) {
            tracing::debug!(bytes = serialized.len(), key = %self.key, "Saved history snapshot");
            true
        } else {
            tracing::warn!(bytes = serialized.len(), key = %self.key, "Storage refused history snapshot");
            false
        }
    }

    /// Load every stored conversation
    ///
    /// Returns an empty list when nothing is stored or the snapshot is corrupt.
    pub fn load(&self) -> Vec<Conversation> {
        let Some(raw) = self.store.get(&self.key) else {
            return Vec::new();
        };

        match decode_snapshot(&raw) {
            Ok(conversations) => conversations,
            Err(e) => {
                tracing::warn!(error = %e, key = %self.key, "Stored history is unreadable; treating as empty");
                Vec::new()
            }
        }
    }

    /// Look up one stored conversation
    pub fn get_conversation(&self, id: &str) -> Option<Conversation> {
        self.load().into_iter().find(|c| c.id == id)
    }

    /// Listing entries for every stored conversation, in stored order
    pub fn list_summaries(&self) -> Vec<ConversationSummary> {
        self.load().iter().map(ConversationSummary::from).collect()
    }

    /// Insert or replace one conversation and persist the whole set
    ///
    /// A conversation not yet stored is placed first, as the most recent.
    pub fn save_conversation(&self, conversation: Conversation) -> bool {
        let _guard = self.lock_writes();
        let mut conversations = self.load();

        match conversations.iter().position(|c| c.id == conversation.id) {
            Some(index) => conversations[index] = conversation,
            None => conversations.insert(0, conversation),
        }

        self.save_unlocked(conversations)
    }

    /// Remove one conversation and persist the rest
    ///
    /// Returns `false` when no conversation has that id.
    pub fn delete_conversation(&self, id: &str) -> bool {
        let _guard = self.lock_writes();
        let mut conversations = self.load();
        let before = conversations.len();
        conversations.retain(|c| c.id != id);

        if conversations.len() == before {
            tracing::debug!(conversation_id = id, "No stored conversation to delete");
            return false;
        }

        self.save_unlocked(conversations)
    }

    /// Measure the stored set against the budget
    pub fn get_storage_info(&self) -> StorageSnapshot {
        let conversations = self.load();
        let used = match encode_snapshot(&conversations) {
            Ok(serialized) => serialized.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to measure stored history");
                0
            }
        };
        StorageSnapshot::measure(used, self.limits().max_storage_bytes, conversations.len())
    }

    /// Whether usage is above the cleanup trigger ratio of the budget
    pub fn needs_cleanup(&self) -> bool {
        self.get_storage_info().used_bytes > self.limits().cleanup_trigger_bytes()
    }

    /// Discard the least recently active 20% of conversations and persist
    ///
    /// The number removed is rounded down, so histories of fewer than five
    /// conversations are left intact.
    pub fn perform_cleanup(&self) -> bool {
        let _guard = self.lock_writes();
        let mut conversations = self.load();
        sort_by_recency(&mut conversations);

        let before = conversations.len();
        let removed = (before as f64 * CLEANUP_REMOVE_RATIO).floor() as usize;
        let keep = before - removed;
        conversations.truncate(keep);

        tracing::info!(removed, kept = keep, "Cleaned up conversation history");
        self.save_unlocked(conversations)
    }

    /// Pretty-printed JSON array of every stored conversation
    pub fn export(&self) -> String {
        let conversations = self.load();
        serde_json::to_string_pretty(&conversations).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize history for export");
            "[]".to_string()
        })
    }

    /// Replace the stored set with an exported JSON array
    ///
    /// The payload must be an array of conversations; anything else is
    /// rejected before any write. Accepted payloads go through the normal
    /// save pipeline, so limits still apply.
    pub fn import(&self, text: &str) -> bool {
        let conversations = match parse_import(text) {
            Ok(conversations) => conversations,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected history import");
                return false;
            }
        };

        let count = conversations.len();
        let _guard = self.lock_writes();
        let saved = self.save_unlocked(conversations);
        if saved {
            tracing::info!(count, "Imported conversation history");
        }
        saved
    }

    /// Remove the stored snapshot entirely
    pub fn clear(&self) -> bool {
        let _guard = self.lock_writes();
        let cleared = self.store.remove(&self.key);
        if cleared {
            tracing::info!(key = %self.key, "Cleared conversation history");
        }
        cleared
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("store", &self.store)
            .field("key", &self.key)
            .field("limits", &self.limits())
            .finish_non_exhaustive()
    }
}

/// Validate and parse an import payload
///
/// # Errors
///
/// Returns `ChatkeepError::InvalidImport` when the text is not JSON, its top
/// level is not an array, or an element is not a conversation.
pub fn parse_import(text: &str) -> std::result::Result<Vec<Conversation>, ChatkeepError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ChatkeepError::InvalidImport(format!("not valid JSON: {}", e)))?;

    if !value.is_array() {
        return Err(ChatkeepError::InvalidImport(
            "top level must be an array of conversations".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| ChatkeepError::InvalidImport(format!("malformed conversation: {}", e)))
}

fn sort_by_recency(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
}

fn apply_caps(
    conversations: &[Conversation],
    max_conversations: usize,
    max_messages: usize,
) -> Vec<Conversation> {
    conversations
        .iter()
        .take(max_conversations)
        .map(|conversation| {
            let mut conversation = conversation.clone();
            if conversation.messages.len() > max_messages {
                let excess = conversation.messages.len() - max_messages;
                conversation.messages.drain(..excess);
            }
            conversation
        })
        .collect()
}

/// Run the save pipeline and return the snapshot text to persist
pub(crate) fn fit_to_budget(
    mut conversations: Vec<Conversation>,
    limits: &HistoryLimits,
    now: DateTime<Utc>,
) -> std::result::Result<String, ChatkeepError> {
    for conversation in conversations.iter_mut() {
        conversation.messages.retain(|m| !m.is_placeholder());
    }

    // An age too large to represent disables expiry.
    let cutoff = now.checked_sub_signed(Duration::days(i64::from(limits.max_age_days)));
    let before = conversations.len();
    conversations.retain(|c| cutoff.map_or(true, |cutoff| c.last_activity() >= cutoff));
    if conversations.len() < before {
        tracing::debug!(expired = before - conversations.len(), "Dropped expired conversations");
    }

    sort_by_recency(&mut conversations);

    let budget = limits.max_storage_bytes;
    let capped = apply_caps(
        &conversations,
        limits.max_conversations,
        limits.max_messages_per_conversation,
    );
    let serialized = encode_snapshot(&capped)?;
    if serialized.len() <= budget {
        return Ok(serialized);
    }

    let aggressive = limits.aggressive();
    tracing::warn!(
        bytes = serialized.len(),
        limit = budget,
        max_conversations = aggressive.max_conversations,
        max_messages = aggressive.max_messages_per_conversation,
        "History over budget; retrying with halved limits"
    );
    let capped = apply_caps(
        &conversations,
        aggressive.max_conversations,
        aggressive.max_messages_per_conversation,
    );
    let serialized = encode_snapshot(&capped)?;
    if serialized.len() <= budget {
        return Ok(serialized);
    }

    if !limits.truncate_oversized {
        return Err(ChatkeepError::QuotaExceeded {
            used: serialized.len(),
            limit: budget,
        });
    }

    match capped.into_iter().next() {
        Some(newest) => truncate_to_fit(newest, budget),
        None => Err(ChatkeepError::QuotaExceeded {
            used: serialized.len(),
            limit: budget,
        }),
    }
}

/// Keep the largest suffix of `conversation`'s messages whose snapshot fits
fn truncate_to_fit(
    conversation: Conversation,
    budget: usize,
) -> std::result::Result<String, ChatkeepError> {
    let total = conversation.messages.len();
    let encode_keeping = |keep: usize| {
        let mut candidate = conversation.clone();
        candidate.messages.drain(..total - keep);
        encode_snapshot(std::slice::from_ref(&candidate))
    };

    let mut best = encode_keeping(0)?;
    if best.len() > budget {
        return Err(ChatkeepError::QuotaExceeded {
            used: best.len(),
            limit: budget,
        });
    }

    // Invariant: keeping `low` messages fits.
    let (mut low, mut high) = (0usize, total);
    while low < high {
        let mid = low + (high - low + 1) / 2;
        let candidate = encode_keeping(mid)?;
        if candidate.len() <= budget {
            low = mid;
            best = candidate;
        } else {
            high = mid - 1;
        }
    }

    tracing::warn!(
        conversation_id = %conversation.id,
        kept = low,
        dropped = total - low,
        "Truncated single conversation to fit the storage budget"
    );
    Ok(best)
}
