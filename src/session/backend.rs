//! Chat backend abstraction

use crate::error::Result;
use crate::history::Source;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A message sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User text
    pub message: String,
    /// Backend conversation id from a previous reply, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// The backend's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Assistant text
    pub response: String,
    /// Citations backing the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    /// Conversation id the backend wants used from now on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatReply {
    /// A reply with text only
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            sources: None,
            conversation_id: None,
        }
    }
}

/// Request/response chat service
///
/// Implementations receive the request's cancellation token so the transport
/// can abort in-flight I/O; callers also race the future against it.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use chatkeep::error::Result;
/// use chatkeep::session::{ChatBackend, ChatReply, ChatRequest};
/// use tokio_util::sync::CancellationToken;
///
/// struct Echo;
///
/// #[async_trait]
/// impl ChatBackend for Echo {
///     async fn send(&self, request: ChatRequest, _token: CancellationToken) -> Result<ChatReply> {
///         Ok(ChatReply::text(request.message))
///     }
///
///     async fn generate_title(&self, first_message: &str, _token: CancellationToken) -> Result<String> {
///         Ok(first_message.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a message and wait for the reply
    async fn send(&self, request: ChatRequest, token: CancellationToken) -> Result<ChatReply>;

    /// Produce a short title from the first user message
    async fn generate_title(&self, first_message: &str, token: CancellationToken)
        -> Result<String>;
}
