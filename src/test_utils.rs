//! Test utilities for Chatkeep
//!
//! Temporary directories, fixture conversations and in-memory managers
//! shared by the unit tests.

use crate::history::{Conversation, HistoryLimits, HistoryManager, Message};
use crate::storage::LocalStore;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory that is removed when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a file named `name` with `content` inside `dir`
///
/// # Panics
///
/// Panics if the file cannot be written
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// A history manager over a fresh in-memory store
pub fn memory_manager(limits: HistoryLimits) -> HistoryManager {
    HistoryManager::new(LocalStore::in_memory(), limits)
}

/// An empty conversation created and last updated at `at`
pub fn conversation_at(id: &str, at: DateTime<Utc>) -> Conversation {
    let mut conversation = Conversation::with_id(id, format!("Conversation {}", id));
    conversation.created_at = at;
    conversation.updated_at = Some(at);
    conversation
}

/// A conversation holding `count` alternating user/assistant messages
///
/// Messages are named `message 1` to `message {count}`, one second apart and
/// ending at the current time.
pub fn conversation_with_messages(id: &str, count: usize) -> Conversation {
    let now = Utc::now();
    let start = now - Duration::seconds(count as i64);
    let mut conversation = conversation_at(id, start);

    for i in 1..=count {
        let content = format!("message {}", i);
        let message = if i % 2 == 1 {
            Message::user(content)
        } else {
            Message::assistant(content)
        };
        conversation.push_message(message.with_timestamp(start + Duration::seconds(i as i64)));
    }
    conversation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.json", "[]");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_conversation_with_messages_is_ordered() {
        let conversation = conversation_with_messages("c1", 4);
        assert_eq!(conversation.messages.len(), 4);
        assert!(conversation
            .messages
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(
            conversation.updated_at,
            Some(conversation.messages[3].timestamp)
        );
    }
}
