//! Cancellation registry for in-flight requests
//!
//! The registry hands out cooperative cancellation tokens keyed by request
//! kind and conversation. At most one live entry exists per key: registering
//! the same key again cancels the previous holder before the new entry becomes
//! visible. Bulk operations cancel by conversation, by kind, or everything.
//!
//! Cancellation is advisory. The registry flips the token; the task that owns
//! it must observe `token.cancelled()` (or `is_cancelled()`) and stop.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub mod sweeper;
pub mod types;

pub use sweeper::{spawn_configured_sweeper, spawn_sweeper};
pub use types::{PendingRequest, RequestHandle, RequestKind};

/// Entries older than this are swept by default
pub const DEFAULT_MAX_REQUEST_AGE: Duration = Duration::from_secs(5 * 60);

struct RequestEntry {
    kind: RequestKind,
    conversation_id: Option<String>,
    created_at: chrono::DateTime<Utc>,
    registered: Instant,
    token: CancellationToken,
    generation: u64,
}

impl RequestEntry {
    fn to_pending(&self, id: &str) -> PendingRequest {
        PendingRequest {
            id: id.to_string(),
            kind: self.kind,
            conversation_id: self.conversation_id.clone(),
            created_at: self.created_at,
            age_ms: u64::try_from(self.registered.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Single-flight registry of cancellable requests
///
/// # Examples
///
/// ```
/// use chatkeep::requests::{RequestKind, RequestRegistry};
///
/// let registry = RequestRegistry::new();
/// let first = registry.register(RequestKind::MessageSend, Some("conv-1"));
/// let second = registry.register(RequestKind::MessageSend, Some("conv-1"));
///
/// assert!(first.is_cancelled());
/// assert!(!second.is_cancelled());
/// assert_eq!(registry.pending_count(), 1);
/// ```
#[derive(Default)]
pub struct RequestRegistry {
    entries: Mutex<HashMap<String, RequestEntry>>,
    sequence: AtomicU64,
}

impl RequestRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RequestEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_key(&self, kind: RequestKind, conversation_id: Option<&str>) -> String {
        match conversation_id {
            Some(conversation_id) => format!("{}-{}", kind, conversation_id),
            // `#` keeps these apart from any `{kind}-{conversation_id}` key.
            None => format!(
                "{}#{}-{}",
                kind,
                Utc::now().timestamp_millis(),
                self.sequence.fetch_add(1, Ordering::Relaxed)
            ),
        }
    }

    /// Register a new request, cancelling any live request with the same key
    ///
    /// The cancel and the insert happen under one lock, so no observer can
    /// see two live entries for a key.
    pub fn register(&self, kind: RequestKind, conversation_id: Option<&str>) -> RequestHandle {
        let id = self.request_key(kind, conversation_id);
        let token = CancellationToken::new();
        let generation = self.sequence.fetch_add(1, Ordering::Relaxed);

        let entry = RequestEntry {
            kind,
            conversation_id: conversation_id.map(str::to_string),
            created_at: Utc::now(),
            registered: Instant::now(),
            token: token.clone(),
            generation,
        };

        let mut entries = self.lock();
        if let Some(previous) = entries.insert(id.clone(), entry) {
            previous.token.cancel();
            tracing::debug!(request_id = %id, "Superseded pending request");
        }
        drop(entries);

        tracing::debug!(request_id = %id, kind = %kind, "Registered request");

        RequestHandle {
            id,
            kind,
            conversation_id: conversation_id.map(str::to_string),
            token,
            generation,
        }
    }

    /// Cancel one request; returns whether it was pending
    pub fn cancel(&self, id: &str, reason: Option<&str>) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                tracing::info!(request_id = id, reason = reason.unwrap_or("unspecified"), "Cancelled request");
                true
            }
            None => false,
        }
    }

    /// Drop the entry for a request that finished on its own, without cancelling
    ///
    /// Does nothing if the entry was already cancelled or superseded by a newer
    /// registration under the same key.
    pub fn complete(&self, handle: &RequestHandle) -> bool {
        let mut entries = self.lock();
        let current = entries
            .get(&handle.id)
            .is_some_and(|entry| entry.generation == handle.generation);
        if current {
            entries.remove(&handle.id);
            tracing::debug!(request_id = %handle.id, "Completed request");
        }
        current
    }

    fn cancel_where<F>(&self, reason: &str, mut predicate: F) -> usize
    where
        F: FnMut(&RequestEntry) -> bool,
    {
        let mut entries = self.lock();
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            if let Some(entry) = entries.remove(id) {
                entry.token.cancel();
            }
        }
        drop(entries);

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), reason, "Cancelled requests");
        }
        ids.len()
    }

    /// Cancel every request for a conversation, optionally of one kind only
    ///
    /// Call this before deleting or switching away from a conversation.
    pub fn cancel_by_conversation(&self, conversation_id: &str, kind: Option<RequestKind>) -> usize {
        self.cancel_where("conversation", |entry| {
            entry.conversation_id.as_deref() == Some(conversation_id)
                && kind.map_or(true, |k| entry.kind == k)
        })
    }

    /// Cancel every request of one kind
    pub fn cancel_by_kind(&self, kind: RequestKind) -> usize {
        self.cancel_where(kind.as_str(), |entry| entry.kind == kind)
    }

    /// Cancel everything
    pub fn cancel_all(&self, reason: Option<&str>) -> usize {
        self.cancel_where(reason.unwrap_or("cancel all"), |_| true)
    }

    /// Whether `id` is still live
    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of live entries
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Live entries belonging to `conversation_id`
    pub fn pending_for_conversation(&self, conversation_id: &str) -> Vec<PendingRequest> {
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.conversation_id.as_deref() == Some(conversation_id))
            .map(|(id, entry)| entry.to_pending(id))
            .collect()
    }

    /// Every live entry, oldest first
    pub fn all_pending(&self) -> Vec<PendingRequest> {
        let mut pending: Vec<PendingRequest> = self
            .lock()
            .iter()
            .map(|(id, entry)| entry.to_pending(id))
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    /// Cancel entries registered more than `max_age` ago
    pub fn cleanup_old(&self, max_age: Duration) -> usize {
        let swept = self.cancel_where("expired", |entry| entry.registered.elapsed() > max_age);
        if swept > 0 {
            tracing::warn!(count = swept, max_age_ms = max_age.as_millis() as u64, "Swept stale requests");
        }
        swept
    }
}

impl std::fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("pending", &self.pending_count())
            .finish()
    }
}
