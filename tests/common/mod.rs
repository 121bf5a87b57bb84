use chatkeep::history::{Conversation, HistoryLimits, HistoryManager, Message};
use chatkeep::storage::{LocalStore, SledBackend, SqliteBackend};
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_sled_history(limits: HistoryLimits) -> (HistoryManager, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let backend = SledBackend::new(tmp.path().join("history.sled")).expect("failed to open sled");
    let manager = HistoryManager::new(LocalStore::new(Box::new(backend)), limits);
    (manager, tmp)
}

#[allow(dead_code)]
pub fn create_sqlite_history(limits: HistoryLimits) -> (HistoryManager, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let backend = SqliteBackend::new_with_path(tmp.path().join("history.db"))
        .expect("failed to create sqlite backend with path");
    let manager = HistoryManager::new(LocalStore::new(Box::new(backend)), limits);
    (manager, tmp)
}

#[allow(dead_code)]
pub fn memory_history(limits: HistoryLimits) -> HistoryManager {
    HistoryManager::new(LocalStore::in_memory(), limits)
}

#[allow(dead_code)]
pub fn conversation_at(id: &str, at: DateTime<Utc>) -> Conversation {
    let mut conversation = Conversation::with_id(id, format!("Conversation {}", id));
    conversation.created_at = at;
    conversation.updated_at = Some(at);
    conversation
}

#[allow(dead_code)]
pub fn conversation_with_messages(id: &str, count: usize, last_at: DateTime<Utc>) -> Conversation {
    let start = last_at - Duration::seconds(count as i64);
    let mut conversation = conversation_at(id, start);
    for i in 1..=count {
        let message = Message::user(format!("message {}", i))
            .with_timestamp(start + Duration::seconds(i as i64));
        conversation.push_message(message);
    }
    conversation
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("chatkeep.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
