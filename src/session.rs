//! Session data model
//!
//! A [`Session`] is the immutable description of what is being timed. Its
//! kind, mode and label are fixed when it is created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of the two timed activities a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    /// Free-form study session
    StudySession,
    /// Timed or untimed mock exam
    ExamSession,
}

impl SessionKind {
    /// Short stable name, used in storage keys and remote paths
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::StudySession => "study",
            SessionKind::ExamSession => "exam",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing mode, carrying the target for countdown sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Counts up indefinitely
    OpenEnded,
    /// Counts down from `target_seconds` and raises TimeUp at zero
    Bounded { target_seconds: u64 },
}

/// Mode tag as it appears in persisted snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModeTag {
    OpenEnded,
    Bounded,
}

impl TimerMode {
    pub fn tag(&self) -> ModeTag {
        match self {
            TimerMode::OpenEnded => ModeTag::OpenEnded,
            TimerMode::Bounded { .. } => ModeTag::Bounded,
        }
    }

    pub fn target_seconds(&self) -> Option<u64> {
        match self {
            TimerMode::OpenEnded => None,
            TimerMode::Bounded { target_seconds } => Some(*target_seconds),
        }
    }
}

/// The unit of work being timed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub kind: SessionKind,
    pub mode: TimerMode,
    /// Subject or exam title
    pub label: String,
    /// Owning user, part of every storage key
    pub owner_id: String,
}

impl Session {
    pub fn open_ended(kind: SessionKind, label: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            kind,
            mode: TimerMode::OpenEnded,
            label: label.into(),
            owner_id: owner_id.into(),
        }
    }

    pub fn bounded(
        kind: SessionKind,
        label: impl Into<String>,
        owner_id: impl Into<String>,
        target_seconds: u64,
    ) -> Self {
        Self {
            kind,
            mode: TimerMode::Bounded { target_seconds },
            label: label.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// The only artifact a finished session produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSessionRecord {
    pub kind: SessionKind,
    pub label: String,
    pub duration_minutes: u64,
    pub ended_at: DateTime<Utc>,
}

/// Round elapsed seconds to whole minutes, never reporting 0 for time spent
pub fn duration_minutes(elapsed_secs: u64) -> u64 {
    if elapsed_secs == 0 {
        return 0;
    }
    ((elapsed_secs + 30) / 60).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_minutes_rounds_half_up() {
        assert_eq!(duration_minutes(90), 2);
        assert_eq!(duration_minutes(89), 1);
        assert_eq!(duration_minutes(150), 3);
        assert_eq!(duration_minutes(3600), 60);
    }

    #[test]
    fn test_duration_minutes_floor_of_one() {
        assert_eq!(duration_minutes(10), 1);
        assert_eq!(duration_minutes(1), 1);
        assert_eq!(duration_minutes(0), 0);
    }

    #[test]
    fn test_record_serialization() {
        let record = CompletedSessionRecord {
            kind: SessionKind::ExamSession,
            label: "Organic chemistry mock".to_string(),
            duration_minutes: 45,
            ended_at: Utc::now(),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"durationMinutes\":45"));
        assert!(json.contains("\"examSession\""));
    }

    #[test]
    fn test_mode_accessors() {
        let session = Session::bounded(SessionKind::ExamSession, "Physics", "u1", 5400);
        assert_eq!(session.mode.target_seconds(), Some(5400));
        assert_eq!(session.mode.tag(), ModeTag::Bounded);
        assert!(Session::open_ended(SessionKind::StudySession, "Math", "u1")
            .mode
            .target_seconds()
            .is_none());
    }
}
