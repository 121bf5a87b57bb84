//! Conversation and message records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human user
    User,
    /// The generative backend
    Assistant,
    /// Client- or backend-injected context
    System,
}

/// A document citation attached to an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Document name or title
    pub document: String,
    /// Page within the document, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Quoted passage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Retrieval relevance score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Source {
    /// Create a citation for `document`
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            page: None,
            excerpt: None,
            score: None,
        }
    }
}

/// A single chat message
///
/// # Examples
///
/// ```
/// use chatkeep::history::{Message, Role};
///
/// let message = Message::user("Where is the invoice from March?");
/// assert_eq!(message.role, Role::User);
/// assert!(!message.is_placeholder());
///
/// let pending = Message::placeholder();
/// assert!(pending.is_placeholder());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: String,
    /// Author role
    pub role: Role,
    /// Text content
    pub content: String,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Citations backing an assistant answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    /// `Some(false)` marks a placeholder whose generation has not finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            sources: None,
            complete: None,
        }
    }

    /// A user message stamped now
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// A finished assistant message stamped now
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// A system message stamped now
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// An empty assistant message standing in for a response still being generated
    pub fn placeholder() -> Self {
        let mut message = Self::with_role(Role::Assistant, "");
        message.complete = Some(false);
        message
    }

    /// Attach citations
    pub fn with_sources(mut self, sources: Option<Vec<Source>>) -> Self {
        self.sources = sources.filter(|s| !s.is_empty());
        self
    }

    /// Override the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this message is an unfinished placeholder
    pub fn is_placeholder(&self) -> bool {
        self.complete == Some(false)
    }
}

/// A titled, ordered sequence of messages with recency metadata
///
/// Messages are kept in insertion order, which callers keep chronological.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable identifier
    pub id: String,
    /// Display title
    pub title: String,
    /// Messages, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Identifier the chat backend uses for this conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Set by [`crate::session::ChatSession::conversation`] while a title
    /// request is in flight; never persisted
    #[serde(skip)]
    pub generating_title: bool,
}

impl Conversation {
    /// Create an empty conversation with a fresh identifier
    ///
    /// # Examples
    ///
    /// ```
    /// use chatkeep::history::Conversation;
    ///
    /// let conversation = Conversation::new("New chat");
    /// assert_eq!(conversation.id.len(), 26);
    /// assert!(conversation.messages.is_empty());
    /// ```
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(new_conversation_id(), title)
    }

    /// Create an empty conversation with a caller-chosen identifier
    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: Some(now),
            remote_id: None,
            generating_title: false,
        }
    }

    /// The timestamp recency decisions are based on
    ///
    /// Falls back to `created_at` when no update was ever recorded.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Append a message and move `updated_at` forward to its timestamp
    pub fn push_message(&mut self, message: Message) {
        let timestamp = message.timestamp;
        self.messages.push(message);
        self.touch_at(timestamp);
    }

    /// Move `updated_at` forward to `at` if it is later than the current activity
    pub fn touch_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at.max(self.last_activity()));
    }

    /// The first user message, used to derive a title
    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::User)
    }
}

/// Lightweight listing entry for a stored conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    /// Conversation identifier
    pub id: String,
    /// Display title
    pub title: String,
    /// Number of stored messages
    pub message_count: usize,
    /// Last activity timestamp
    pub last_activity: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            message_count: conversation.messages.len(),
            last_activity: conversation.last_activity(),
        }
    }
}

/// Generate a new sortable conversation identifier (ULID)
pub fn new_conversation_id() -> String {
    Ulid::new().to_string()
}

/// Generate a new message identifier (UUID v4)
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_new_conversation_id_is_unique_ulid() {
        let a = new_conversation_id();
        let b = new_conversation_id();
        assert_eq!(a.len(), 26);
        assert_ne!(a, b);
    }

    #[test]
    fn test_last_activity_falls_back_to_created_at() {
        let mut conversation = Conversation::with_id("c1", "t");
        conversation.updated_at = None;
        assert_eq!(conversation.last_activity(), conversation.created_at);
    }

    #[test]
    fn test_push_message_advances_updated_at() {
        let mut conversation = Conversation::with_id("c1", "t");
        let later = conversation.created_at + Duration::minutes(5);
        conversation.push_message(Message::user("hi").with_timestamp(later));
        assert_eq!(conversation.updated_at, Some(later));
    }

    #[test]
    fn test_push_message_never_moves_updated_at_backwards() {
        let mut conversation = Conversation::with_id("c1", "t");
        let before = conversation.last_activity();
        conversation.push_message(Message::user("old").with_timestamp(before - Duration::days(1)));
        assert_eq!(conversation.last_activity(), before);
    }

    #[test]
    fn test_generating_title_is_not_serialized() {
        let mut conversation = Conversation::with_id("c1", "t");
        conversation.generating_title = true;
        let json = serde_json::to_string(&conversation).unwrap();
        assert!(!json.contains("generating_title"));
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert!(!back.generating_title);
    }

    #[test]
    fn test_timestamps_roundtrip_losslessly() {
        let mut conversation = Conversation::with_id("c1", "t");
        conversation.push_message(Message::user("hello"));
        let json = serde_json::to_string(&conversation).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.created_at, conversation.created_at);
        assert_eq!(back.messages[0].timestamp, conversation.messages[0].timestamp);
    }

    #[test]
    fn test_empty_sources_are_dropped() {
        let message = Message::assistant("answer").with_sources(Some(vec![]));
        assert!(message.sources.is_none());
        let message = Message::assistant("answer").with_sources(Some(vec![Source::new("a.pdf")]));
        assert_eq!(message.sources.map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_first_user_message_skips_system() {
        let mut conversation = Conversation::with_id("c1", "t");
        conversation.push_message(Message::system("context"));
        conversation.push_message(Message::user("question"));
        assert_eq!(
            conversation.first_user_message().map(|m| m.content.as_str()),
            Some("question")
        );
    }
}
