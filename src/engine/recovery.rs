//! Recovery loader
//!
//! Rebuilds accumulated time from the local snapshot when an engine is
//! constructed. A snapshot that was running when the process went away is
//! credited with the wall-clock time that passed in between.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::session::Session;
use crate::store::{Snapshot, SnapshotKey, SnapshotStore, StoreError};
use crate::timer::whole_seconds_between;

/// Engine state reconstructed from a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovered {
    /// No usable snapshot
    Fresh,
    Paused { accumulated_secs: u64 },
    /// Was running; includes the credited absence
    Running { accumulated_secs: u64 },
    /// Bounded session that ran out before the user finalized it
    TimedUp { accumulated_secs: u64 },
}

/// Load and interpret the snapshot for `key`.
///
/// Stale (different session) or unreadable snapshots are deleted and the
/// engine starts clean.
pub fn recover(
    store: &dyn SnapshotStore,
    key: &SnapshotKey,
    session: &Session,
    now: DateTime<Utc>,
    max_credited_gap_secs: Option<u64>,
) -> Recovered {
    let snapshot = match store.load(key) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return Recovered::Fresh,
        Err(e @ StoreError::Corrupt { .. }) => {
            warn!("Discarding unreadable snapshot for {}: {}", key, e);
            discard(store, key);
            return Recovered::Fresh;
        }
        Err(e) => {
            warn!("Failed to load snapshot for {}: {}", key, e);
            return Recovered::Fresh;
        }
    };

    if !belongs_to(&snapshot, session) {
        info!(
            "Discarding stale snapshot for {} (was '{}', starting '{}')",
            key, snapshot.label, session.label
        );
        discard(store, key);
        return Recovered::Fresh;
    }

    if snapshot.finished {
        info!(
            "Recovered timed-up session '{}' ({}s)",
            snapshot.label, snapshot.accumulated_seconds
        );
        return Recovered::TimedUp {
            accumulated_secs: snapshot.accumulated_seconds,
        };
    }

    if !snapshot.desired_running {
        info!(
            "Recovered paused session '{}' ({}s)",
            snapshot.label, snapshot.accumulated_seconds
        );
        return Recovered::Paused {
            accumulated_secs: snapshot.accumulated_seconds,
        };
    }

    let absent_secs = whole_seconds_between(snapshot.last_written_at, now);
    let credited_secs = match max_credited_gap_secs {
        Some(cap) if absent_secs > cap => {
            warn!(
                "Process was away {}s, crediting only {}s to '{}'",
                absent_secs, cap, snapshot.label
            );
            cap
        }
        _ => absent_secs,
    };

    info!(
        "Recovered running session '{}' ({}s + {}s while away)",
        snapshot.label, snapshot.accumulated_seconds, credited_secs
    );
    Recovered::Running {
        accumulated_secs: snapshot.accumulated_seconds.saturating_add(credited_secs),
    }
}

/// A snapshot only resumes the session it was written for
fn belongs_to(snapshot: &Snapshot, session: &Session) -> bool {
    snapshot.label == session.label
        && snapshot.mode == session.mode.tag()
        && snapshot.target_seconds == session.mode.target_seconds()
}

fn discard(store: &dyn SnapshotStore, key: &SnapshotKey) {
    if let Err(e) = store.delete(key) {
        warn!("Failed to delete snapshot for {}: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ModeTag, SessionKind};
    use crate::store::{FileSnapshotStore, MemorySnapshotStore};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 20, 0, 0).unwrap()
    }

    fn study() -> Session {
        Session::open_ended(SessionKind::StudySession, "Thermodynamics", "user-1")
    }

    fn key() -> SnapshotKey {
        SnapshotKey::new("user-1", SessionKind::StudySession)
    }

    fn snapshot(accumulated_seconds: u64, desired_running: bool) -> Snapshot {
        Snapshot {
            accumulated_seconds,
            desired_running,
            finished: false,
            last_written_at: t0(),
            target_seconds: None,
            mode: ModeTag::OpenEnded,
            label: "Thermodynamics".to_string(),
        }
    }

    #[test]
    fn test_no_snapshot_is_fresh() {
        let store = MemorySnapshotStore::new();
        assert_eq!(recover(&store, &key(), &study(), t0(), None), Recovered::Fresh);
    }

    #[test]
    fn test_paused_snapshot_has_no_drift() {
        let store = MemorySnapshotStore::new();
        store.insert(key(), snapshot(754, false));

        for hours_later in [0, 1, 72] {
            let now = t0() + Duration::hours(hours_later);
            assert_eq!(
                recover(&store, &key(), &study(), now, None),
                Recovered::Paused {
                    accumulated_secs: 754
                }
            );
        }
    }

    #[test]
    fn test_running_snapshot_credits_absence() {
        let store = MemorySnapshotStore::new();
        store.insert(key(), snapshot(300, true));

        let now = t0() + Duration::seconds(60);
        assert_eq!(
            recover(&store, &key(), &study(), now, None),
            Recovered::Running {
                accumulated_secs: 360
            }
        );
    }

    #[test]
    fn test_credited_gap_can_be_capped() {
        let store = MemorySnapshotStore::new();
        store.insert(key(), snapshot(300, true));

        let now = t0() + Duration::hours(8);
        assert_eq!(
            recover(&store, &key(), &study(), now, Some(600)),
            Recovered::Running {
                accumulated_secs: 900
            }
        );
    }

    #[test]
    fn test_label_mismatch_discards_snapshot() {
        let store = MemorySnapshotStore::new();
        store.insert(key(), snapshot(300, true));

        let other = Session::open_ended(SessionKind::StudySession, "Optics", "user-1");
        assert_eq!(recover(&store, &key(), &other, t0(), None), Recovered::Fresh);
        assert!(store.get(&key()).is_none());
    }

    #[test]
    fn test_mode_mismatch_discards_snapshot() {
        let store = MemorySnapshotStore::new();
        store.insert(key(), snapshot(300, false));

        let bounded = Session::bounded(SessionKind::StudySession, "Thermodynamics", "user-1", 1800);
        assert_eq!(recover(&store, &key(), &bounded, t0(), None), Recovered::Fresh);
    }

    #[test]
    fn test_finished_snapshot_recovers_as_timed_up() {
        let store = MemorySnapshotStore::new();
        let session = Session::bounded(SessionKind::StudySession, "Thermodynamics", "user-1", 300);
        store.insert(
            key(),
            Snapshot {
                finished: true,
                target_seconds: Some(300),
                mode: ModeTag::Bounded,
                ..snapshot(300, false)
            },
        );

        assert_eq!(
            recover(&store, &key(), &session, t0() + Duration::hours(1), None),
            Recovered::TimedUp {
                accumulated_secs: 300
            }
        );
    }

    #[test]
    fn test_corrupt_snapshot_is_discarded() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = FileSnapshotStore::new(temp_dir.path());
        let path = temp_dir.path().join(format!("{}.json", key().file_stem()));
        std::fs::write(&path, b"\x00\x01garbage").expect("write garbage");

        assert_eq!(recover(&store, &key(), &study(), t0(), None), Recovered::Fresh);
        assert!(!path.exists());
    }
}
