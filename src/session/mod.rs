//! Orchestration of history and cancellation around backend calls
//!
//! [`ChatSession`] is the only place that talks to both the
//! [`HistoryManager`] and the [`RequestRegistry`]. Every backend call is
//! wrapped in a register/complete pair, and a result is applied to the store
//! only if its request was not cancelled while it was in flight. Retiring a
//! conversation cancels its requests before the store is touched.

use crate::error::{ChatkeepError, Result};
use crate::history::{Conversation, HistoryManager, Message};
use crate::requests::{RequestHandle, RequestKind, RequestRegistry};
use std::future::Future;
use std::sync::Arc;

pub mod backend;

pub use backend::{ChatBackend, ChatReply, ChatRequest};

/// Title given to conversations created implicitly by a first message
pub const DEFAULT_TITLE: &str = "New conversation";

const MAX_TITLE_CHARS: usize = 50;

/// What [`ChatSession::retire_conversation`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetireOutcome {
    /// Pending requests cancelled for the conversation
    pub cancelled: usize,
    /// Whether the conversation was removed from the store
    pub deleted: bool,
}

/// Chat front end over a backend, the history store and the request registry
pub struct ChatSession<B: ChatBackend> {
    history: Arc<HistoryManager>,
    requests: Arc<RequestRegistry>,
    backend: B,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Create a session sharing `history` and `requests` with other owners
    pub fn new(history: Arc<HistoryManager>, requests: Arc<RequestRegistry>, backend: B) -> Self {
        Self {
            history,
            requests,
            backend,
        }
    }

    /// The history store
    pub fn history(&self) -> &Arc<HistoryManager> {
        &self.history
    }

    /// The request registry
    pub fn requests(&self) -> &Arc<RequestRegistry> {
        &self.requests
    }

    /// Create and persist an empty conversation
    pub fn start_conversation(&self, title: impl Into<String>) -> Conversation {
        let conversation = Conversation::new(title);
        if !self.history.save_conversation(conversation.clone()) {
            tracing::warn!(conversation_id = %conversation.id, "New conversation was not persisted");
        }
        conversation
    }

    /// Run `work` under `handle`, failing with `Cancelled` if the token fires
    /// first or fired before the result could be applied
    async fn run_cancellable<T, F>(&self, handle: &RequestHandle, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let outcome: Result<T> = tokio::select! {
            biased;

            _ = handle.token.cancelled() => Err(ChatkeepError::Cancelled(handle.id.clone()).into()),
            result = work => result,
        };
        self.requests.complete(handle);

        let value = outcome?;
        handle.ensure_active()?;
        Ok(value)
    }

    /// Send `text` in conversation `conversation_id` and store the reply
    ///
    /// The user message is persisted before the backend is called. A
    /// conversation that does not exist yet is created. Registering the send
    /// cancels any earlier send still pending for the same conversation.
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Cancelled` if the request was cancelled before
    /// the reply was applied, `ChatkeepError::NotFound` if the conversation
    /// was deleted while the request was in flight, or the backend's error.
    pub async fn send_message(&self, conversation_id: &str, text: &str) -> Result<Message> {
        let mut conversation = self
            .history
            .get_conversation(conversation_id)
            .unwrap_or_else(|| Conversation::with_id(conversation_id, DEFAULT_TITLE));
        conversation.push_message(Message::user(text));
        if !self.history.save_conversation(conversation.clone()) {
            tracing::warn!(conversation_id, "User message was not persisted");
        }

        let handle = self
            .requests
            .register(RequestKind::MessageSend, Some(conversation_id));
        let request = ChatRequest {
            message: text.to_string(),
            conversation_id: conversation.remote_id.clone(),
        };

        let reply = self
            .run_cancellable(&handle, self.backend.send(request, handle.token.clone()))
            .await
            .map_err(|e| {
                tracing::debug!(conversation_id, error = %e, "Message send did not complete");
                e
            })?;

        // Apply to the latest stored copy so concurrent edits are kept.
        let Some(mut latest) = self.history.get_conversation(conversation_id) else {
            tracing::debug!(conversation_id, "Conversation removed while in flight; dropping reply");
            return Err(ChatkeepError::NotFound(conversation_id.to_string()).into());
        };
        let message = Message::assistant(reply.response).with_sources(reply.sources);
        latest.push_message(message.clone());
        if let Some(remote_id) = reply.conversation_id {
            latest.remote_id = Some(remote_id);
        }
        if !self.history.save_conversation(latest) {
            tracing::warn!(conversation_id, "Assistant reply was not persisted");
        }

        tracing::info!(conversation_id, "Stored assistant reply");
        Ok(message)
    }

    /// Ask the backend for a title based on the first user message and store it
    ///
    /// Conversations without a user message keep their current title.
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::NotFound` for an unknown id,
    /// `ChatkeepError::Cancelled` if the request was cancelled, or the
    /// backend's error.
    pub async fn generate_title(&self, conversation_id: &str) -> Result<String> {
        let conversation = self
            .history
            .get_conversation(conversation_id)
            .ok_or_else(|| ChatkeepError::NotFound(conversation_id.to_string()))?;

        let Some(first) = conversation.first_user_message().map(|m| m.content.clone()) else {
            return Ok(conversation.title);
        };

        let handle = self
            .requests
            .register(RequestKind::TitleGeneration, Some(conversation_id));
        let generated = self
            .run_cancellable(
                &handle,
                self.backend.generate_title(&first, handle.token.clone()),
            )
            .await?;
        let title = if generated.trim().is_empty() {
            truncate_title(&first)
        } else {
            truncate_title(&generated)
        };

        if let Some(mut latest) = self.history.get_conversation(conversation_id) {
            latest.title = title.clone();
            if !self.history.save_conversation(latest) {
                tracing::warn!(conversation_id, "Generated title was not persisted");
            }
        }

        tracing::debug!(conversation_id, title = %title, "Generated conversation title");
        Ok(title)
    }

    /// Whether a title request is in flight for `conversation_id`
    pub fn is_generating_title(&self, conversation_id: &str) -> bool {
        self.requests
            .pending_for_conversation(conversation_id)
            .iter()
            .any(|pending| pending.kind == RequestKind::TitleGeneration)
    }

    /// Load a stored conversation with its transient state filled in
    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        let mut conversation = self.history.get_conversation(conversation_id)?;
        conversation.generating_title = self.is_generating_title(conversation_id);
        Some(conversation)
    }

    /// Cancel everything attached to `from`, then load `to`
    pub fn switch_conversation(&self, from: Option<&str>, to: &str) -> Option<Conversation> {
        if let Some(from) = from {
            let cancelled = self.requests.cancel_by_conversation(from, None);
            tracing::debug!(from, to, cancelled, "Switching conversation");
        }
        self.conversation(to)
    }

    /// Cancel every request for `conversation_id`, then delete it from the store
    pub fn retire_conversation(&self, conversation_id: &str) -> RetireOutcome {
        let cancelled = self.requests.cancel_by_conversation(conversation_id, None);
        let deleted = self.history.delete_conversation(conversation_id);
        tracing::info!(conversation_id, cancelled, deleted, "Retired conversation");
        RetireOutcome { cancelled, deleted }
    }
}

fn truncate_title(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }
    let mut title: String = trimmed.chars().take(MAX_TITLE_CHARS - 3).collect();
    title.push_str("...");
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryLimits;
    use crate::test_utils::memory_manager;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct FixedBackend {
        reply: ChatReply,
        title: String,
    }

    #[async_trait]
    impl ChatBackend for FixedBackend {
        async fn send(&self, _request: ChatRequest, _token: CancellationToken) -> Result<ChatReply> {
            Ok(self.reply.clone())
        }

        async fn generate_title(&self, _first: &str, _token: CancellationToken) -> Result<String> {
            Ok(self.title.clone())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ChatBackend for FailingBackend {
        async fn send(&self, _request: ChatRequest, _token: CancellationToken) -> Result<ChatReply> {
            Err(ChatkeepError::Backend("service unavailable".into()).into())
        }

        async fn generate_title(&self, _first: &str, _token: CancellationToken) -> Result<String> {
            Err(ChatkeepError::Backend("service unavailable".into()).into())
        }
    }

    fn session<B: ChatBackend>(backend: B) -> ChatSession<B> {
        ChatSession::new(
            Arc::new(memory_manager(HistoryLimits::default())),
            Arc::new(RequestRegistry::new()),
            backend,
        )
    }

    fn fixed(reply: &str, title: &str) -> FixedBackend {
        FixedBackend {
            reply: ChatReply::text(reply),
            title: title.to_string(),
        }
    }

    #[test]
    fn test_truncate_title() {
        assert_eq!(truncate_title("  Short title "), "Short title");
        let long = "a".repeat(60);
        let title = truncate_title(&long);
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
    }

    #[tokio::test]
    async fn test_send_message_stores_both_messages() {
        let session = session(FixedBackend {
            reply: ChatReply {
                response: "It is in folder B".into(),
                sources: Some(vec![crate::history::Source::new("index.pdf")]),
                conversation_id: Some("remote-7".into()),
            },
            title: String::new(),
        });
        let conversation = session.start_conversation("Invoices");

        let reply = session
            .send_message(&conversation.id, "Where is the March invoice?")
            .await
            .unwrap();
        assert_eq!(reply.content, "It is in folder B");

        let stored = session.history().get_conversation(&conversation.id).unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].content, "Where is the March invoice?");
        assert_eq!(stored.messages[1].sources.as_ref().map(Vec::len), Some(1));
        assert_eq!(stored.remote_id.as_deref(), Some("remote-7"));
        assert_eq!(session.requests().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_message_creates_missing_conversation() {
        let session = session(fixed("hi", ""));
        session.send_message("fresh", "hello").await.unwrap();

        let stored = session.history().get_conversation("fresh").unwrap();
        assert_eq!(stored.title, DEFAULT_TITLE);
        assert_eq!(stored.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_backend_error_keeps_user_message_and_clears_registry() {
        let session = session(FailingBackend);
        let conversation = session.start_conversation("t");

        let err = session.send_message(&conversation.id, "hello").await.unwrap_err();
        assert!(err.to_string().contains("service unavailable"));

        let stored = session.history().get_conversation(&conversation.id).unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(session.requests().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_title_uses_backend_and_truncates() {
        let session = session(fixed("ok", &"Quarterly numbers ".repeat(5)));
        session.send_message("c1", "Summarize Q3").await.unwrap();

        let title = session.generate_title("c1").await.unwrap();
        assert_eq!(title.chars().count(), 50);
        assert_eq!(session.history().get_conversation("c1").unwrap().title, title);
    }

    #[tokio::test]
    async fn test_generate_title_falls_back_to_first_message() {
        let session = session(fixed("ok", "   "));
        session.send_message("c1", "Budget review").await.unwrap();
        assert_eq!(session.generate_title("c1").await.unwrap(), "Budget review");
    }

    #[tokio::test]
    async fn test_generate_title_without_user_message_keeps_title() {
        let session = session(fixed("ok", "ignored"));
        let conversation = session.start_conversation("Untitled");
        assert_eq!(session.generate_title(&conversation.id).await.unwrap(), "Untitled");
    }

    #[tokio::test]
    async fn test_generate_title_unknown_conversation() {
        let session = session(fixed("ok", "t"));
        let err = session.generate_title("ghost").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatkeepError>(),
            Some(ChatkeepError::NotFound(_))
        ));
    }

    #[test]
    fn test_retire_cancels_before_deleting() {
        let session = session(fixed("ok", "t"));
        let conversation = session.start_conversation("doomed");
        let handle = session
            .requests()
            .register(RequestKind::MessageSend, Some(conversation.id.as_str()));

        let outcome = session.retire_conversation(&conversation.id);
        assert_eq!(
            outcome,
            RetireOutcome {
                cancelled: 1,
                deleted: true
            }
        );
        assert!(handle.is_cancelled());
        assert!(session.history().get_conversation(&conversation.id).is_none());
    }

    #[test]
    fn test_switch_conversation_cancels_previous() {
        let session = session(fixed("ok", "t"));
        let a = session.start_conversation("a");
        let b = session.start_conversation("b");
        let pending = session.requests().register(RequestKind::MessageSend, Some(a.id.as_str()));

        let loaded = session.switch_conversation(Some(a.id.as_str()), &b.id);
        assert_eq!(loaded.map(|c| c.id), Some(b.id));
        assert!(pending.is_cancelled());
        assert!(session.switch_conversation(None, "missing").is_none());
    }
}
