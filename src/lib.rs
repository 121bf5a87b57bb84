//! Chatkeep - bounded conversation history with cooperative cancellation
//!
//! This library keeps a chat client's conversation history in a local
//! key-value store under a fixed byte budget, and tracks the asynchronous
//! requests attached to each conversation so they can be cancelled when the
//! conversation is switched away from or deleted.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: Key-value substrate (sled, SQLite, memory) with quota enforcement
//! - `history`: Bounded conversation store and its snapshot format
//! - `requests`: Single-flight cancellation registry and background sweeper
//! - `session`: Orchestration of backend calls around history and requests
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Operator command-line interface
//!
//! # Example
//!
//! ```
//! use chatkeep::history::{Conversation, HistoryLimits, HistoryManager, Message};
//! use chatkeep::requests::{RequestKind, RequestRegistry};
//! use chatkeep::storage::LocalStore;
//!
//! let history = HistoryManager::new(LocalStore::in_memory(), HistoryLimits::default());
//! let requests = RequestRegistry::new();
//!
//! let mut conversation = Conversation::new("Contracts");
//! conversation.push_message(Message::user("Which contracts expire this year?"));
//! assert!(history.save_conversation(conversation.clone()));
//!
//! let pending = requests.register(RequestKind::MessageSend, Some(conversation.id.as_str()));
//! requests.cancel_by_conversation(&conversation.id, None);
//! assert!(pending.is_cancelled());
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod requests;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChatkeepError, Result};
pub use history::{Conversation, HistoryLimits, HistoryManager, Message, Role};
pub use requests::{RequestHandle, RequestKind, RequestRegistry};
pub use session::{ChatBackend, ChatSession};
pub use storage::LocalStore;

#[cfg(test)]
pub mod test_utils;
