//! Remote status synchronization
//!
//! The engine pushes its status to a shared remote store so other devices
//! of the same user can see a session in progress. Everything here is
//! best-effort: callers never wait on the network and never see a failure.

mod publisher;
mod remote;

pub use publisher::QueuedPublisher;
pub use remote::{HttpStatusSink, RemoteStatusSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::{trace, warn};

use crate::session::{ModeTag, SessionKind};
use crate::store::{Snapshot, SnapshotKey};

/// Fire-and-forget status publisher.
///
/// Both calls must return immediately and be safe to call at heartbeat rate.
pub trait StatusPublisher: Send + Sync {
    fn publish(&self, key: &SnapshotKey, snapshot: &Snapshot);
    fn retract(&self, key: &SnapshotKey);
}

/// Publisher used when no remote endpoint is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl StatusPublisher for NullPublisher {
    fn publish(&self, key: &SnapshotKey, _snapshot: &Snapshot) {
        trace!("Remote sync disabled, not publishing {}", key);
    }

    fn retract(&self, key: &SnapshotKey) {
        trace!("Remote sync disabled, not retracting {}", key);
    }
}

/// Status document as stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    pub owner_id: String,
    pub kind: SessionKind,
    pub label: String,
    pub mode: ModeTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_seconds: Option<u64>,
    /// Informational only; consumers must not treat it as authoritative
    pub accumulated_seconds: u64,
    pub running: bool,
    pub finished: bool,
    pub updated_at: DateTime<Utc>,
    pub device_id: String,
}

impl RemoteStatus {
    pub fn from_snapshot(key: &SnapshotKey, snapshot: &Snapshot) -> Self {
        Self {
            owner_id: key.owner_id.clone(),
            kind: key.kind,
            label: snapshot.label.clone(),
            mode: snapshot.mode,
            target_seconds: snapshot.target_seconds,
            accumulated_seconds: snapshot.accumulated_seconds,
            running: snapshot.desired_running,
            finished: snapshot.finished,
            updated_at: snapshot.last_written_at,
            device_id: device_id().to_string(),
        }
    }
}

/// Hashed machine identifier, computed once per process
pub fn device_id() -> &'static str {
    static DEVICE_ID: OnceLock<String> = OnceLock::new();
    DEVICE_ID.get_or_init(|| match machine_uid::get() {
        Ok(uid) => {
            let digest = Sha256::digest(uid.as_bytes());
            hex::encode(digest)[..16].to_string()
        }
        Err(e) => {
            warn!("Failed to read machine id: {}", e);
            "unknown-device".to_string()
        }
    })
}

#[cfg(test)]
pub use test_support::{PublishCall, RecordingPublisher};


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_from_snapshot() {
        let key = SnapshotKey::new("user-9", SessionKind::ExamSession);
        let snapshot = Snapshot {
            accumulated_seconds: 1200,
            desired_running: true,
            finished: false,
            last_written_at: Utc::now(),
            target_seconds: Some(3600),
            mode: ModeTag::Bounded,
            label: "Calculus final".to_string(),
        };

        let status = RemoteStatus::from_snapshot(&key, &snapshot);
        assert_eq!(status.owner_id, "user-9");
        assert!(status.running);
        assert_eq!(status.device_id, device_id());

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"ownerId\":\"user-9\""));
        assert!(json.contains("\"targetSeconds\":3600"));
    }
}
