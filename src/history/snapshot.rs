//! Persisted snapshot format and storage usage reporting

use super::types::Conversation;
use serde::{Deserialize, Serialize};

/// Version written into every persisted snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    conversations: &'a [Conversation],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotIn {
    Versioned {
        version: u32,
        conversations: Vec<Conversation>,
    },
    Legacy(Vec<Conversation>),
}

/// Serialize conversations into the persisted envelope
pub(crate) fn encode_snapshot(conversations: &[Conversation]) -> serde_json::Result<String> {
    serde_json::to_string(&SnapshotOut {
        version: SNAPSHOT_VERSION,
        conversations,
    })
}

/// Parse a persisted snapshot, accepting the versioned envelope or a bare array
pub(crate) fn decode_snapshot(raw: &str) -> serde_json::Result<Vec<Conversation>> {
    match serde_json::from_str::<SnapshotIn>(raw)? {
        SnapshotIn::Versioned {
            version,
            conversations,
        } => {
            if version > SNAPSHOT_VERSION {
                tracing::warn!(
                    version,
                    supported = SNAPSHOT_VERSION,
                    "Snapshot written by a newer version; loading best-effort"
                );
            }
            Ok(conversations)
        }
        SnapshotIn::Legacy(conversations) => Ok(conversations),
    }
}

/// Storage usage derived from the current persisted set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageSnapshot {
    /// Serialized size of the stored conversations in bytes
    pub used_bytes: usize,
    /// Configured budget in bytes
    pub max_bytes: usize,
    /// Number of stored conversations
    pub conversation_count: usize,
    /// `used_bytes` as a percentage of `max_bytes`
    pub percentage: f64,
    /// `used_bytes` formatted for display
    pub used_display: String,
    /// `max_bytes` formatted for display
    pub max_display: String,
}

impl StorageSnapshot {
    /// Build a snapshot from raw measurements
    pub fn measure(used_bytes: usize, max_bytes: usize, conversation_count: usize) -> Self {
        let percentage = if max_bytes == 0 {
            0.0
        } else {
            (used_bytes as f64 / max_bytes as f64) * 100.0
        };

        Self {
            used_bytes,
            max_bytes,
            conversation_count,
            percentage,
            used_display: format_bytes(used_bytes),
            max_display: format_bytes(max_bytes),
        }
    }
}

/// Format a byte count in base-1024 units with up to two decimals
///
/// # Examples
///
/// ```
/// use chatkeep::history::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(4 * 1024 * 1024), "4 MB");
/// ```
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let fixed = format!("{:.2}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
