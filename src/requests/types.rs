//! Request kinds, handles and pending-request reports

use crate::error::{ChatkeepError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// The kind of asynchronous operation a registry entry tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    /// Sending a chat message and awaiting the reply
    MessageSend,
    /// Uploading a document for indexing
    DocumentUpload,
    /// Generating a conversation title
    TitleGeneration,
    /// Transcribing recorded audio
    Transcription,
    /// Fetching a conversation from the backend
    ConversationLoad,
}

impl RequestKind {
    /// Every kind, in declaration order
    pub const ALL: [RequestKind; 5] = [
        RequestKind::MessageSend,
        RequestKind::DocumentUpload,
        RequestKind::TitleGeneration,
        RequestKind::Transcription,
        RequestKind::ConversationLoad,
    ];

    /// Kebab-case name, also used as the key prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::MessageSend => "message-send",
            RequestKind::DocumentUpload => "document-upload",
            RequestKind::TitleGeneration => "title-generation",
            RequestKind::Transcription => "transcription",
            RequestKind::ConversationLoad => "conversation-load",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = ChatkeepError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RequestKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ChatkeepError::Config(format!("Unknown request kind: {}", s)))
    }
}

/// What `register` hands back to the caller
///
/// The caller passes `token` (or a clone) into its async work and checks it
/// after every await point, then calls
/// [`RequestRegistry::complete`](super::RequestRegistry::complete) when done.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    /// Registry key
    pub id: String,
    /// Operation kind
    pub kind: RequestKind,
    /// Owning conversation, if any
    pub conversation_id: Option<String>,
    /// Cooperative cancellation signal
    pub token: CancellationToken,
    pub(crate) generation: u64,
}

impl RequestHandle {
    /// Whether the registry (or anyone holding the token) cancelled this request
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with `ChatkeepError::Cancelled` if the request was cancelled
    ///
    /// # Examples
    ///
    /// ```
    /// use chatkeep::requests::{RequestKind, RequestRegistry};
    ///
    /// let registry = RequestRegistry::new();
    /// let handle = registry.register(RequestKind::MessageSend, Some("conv-1"));
    /// assert!(handle.ensure_active().is_ok());
    ///
    /// registry.cancel(&handle.id, Some("user switched conversation"));
    /// assert!(handle.ensure_active().is_err());
    /// ```
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ChatkeepError::Cancelled(self.id.clone()).into());
        }
        Ok(())
    }
}

/// Diagnostic view of a live registry entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequest {
    /// Registry key
    pub id: String,
    /// Operation kind
    pub kind: RequestKind,
    /// Owning conversation, if any
    pub conversation_id: Option<String>,
    /// When the entry was registered
    pub created_at: DateTime<Utc>,
    /// Age in milliseconds at the time of the report
    pub age_ms: u64,
}
