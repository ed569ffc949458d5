//! Local snapshot persistence
//!
//! One snapshot per `(owner, kind)` holds enough of the engine state to
//! rebuild it after a reload or crash.

mod file;
#[cfg(test)]
mod memory;

pub use file::FileSnapshotStore;
#[cfg(test)]
pub use memory::MemorySnapshotStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::session::{ModeTag, SessionKind};

/// Persisted engine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Live elapsed seconds as of `last_written_at`
    pub accumulated_seconds: u64,
    /// The user's last explicit intent
    pub desired_running: bool,
    /// Set once the session reached a resting end state (time-up)
    pub finished: bool,
    pub last_written_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_seconds: Option<u64>,
    pub mode: ModeTag,
    pub label: String,
}

/// Storage key: one active session of each kind per user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub owner_id: String,
    pub kind: SessionKind,
}

impl SnapshotKey {
    pub fn new(owner_id: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            owner_id: owner_id.into(),
            kind,
        }
    }

    /// Filesystem-safe name that does not leak the owner ID
    pub fn file_stem(&self) -> String {
        let digest = Sha256::digest(self.owner_id.as_bytes());
        let hash = hex::encode(digest);
        format!("{}-{}", self.kind.as_str(), &hash[..16])
    }
}

impl std::fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.kind)
    }
}

/// Errors from a snapshot store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot I/O failed at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot at {path:?} could not be parsed: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable key-value store for snapshots.
///
/// Implementations must survive process restarts and give read-after-write
/// consistency. Calls are synchronous and expected to be fast.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, key: &SnapshotKey, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing is stored for `key`
    fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError>;

    /// Deleting a missing snapshot is not an error
    fn delete(&self, key: &SnapshotKey) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_file_stem_is_stable_and_opaque() {
        let key = SnapshotKey::new("alice@example.com", SessionKind::StudySession);
        let stem = key.file_stem();
        assert_eq!(stem, key.file_stem());
        assert!(stem.starts_with("study-"));
        assert_eq!(stem.len(), "study-".len() + 16);
        assert!(!stem.contains("alice"));

        let exam = SnapshotKey::new("alice@example.com", SessionKind::ExamSession);
        assert_ne!(exam.file_stem(), stem);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = Snapshot {
            accumulated_seconds: 61,
            desired_running: true,
            finished: false,
            last_written_at: Utc::now(),
            target_seconds: None,
            mode: ModeTag::OpenEnded,
            label: "Linear algebra".to_string(),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"accumulatedSeconds\":61"));
        assert!(json.contains("\"desiredRunning\":true"));
        assert!(!json.contains("targetSeconds"));

        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
