//! Elapsed-time accumulator
//!
//! Elapsed time is derived from segment boundary timestamps, never from a
//! count of ticks. A tick loop that is throttled, delayed or batched by the
//! host still reads the right value on its next call.

use chrono::{DateTime, Utc};

/// Whole seconds from `from` to `to`, clamped at zero for a clock that went backwards
pub fn whole_seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_seconds().max(0) as u64
}

/// Committed time plus at most one open running segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
    /// Sum of all completed segments
    accumulated_secs: u64,
    /// Start of the open segment, `Some` iff running
    segment_started_at: Option<DateTime<Utc>>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously committed time (recovery)
    pub fn with_accumulated(accumulated_secs: u64) -> Self {
        Self {
            accumulated_secs,
            segment_started_at: None,
        }
    }

    pub fn accumulated_secs(&self) -> u64 {
        self.accumulated_secs
    }

    pub fn is_open(&self) -> bool {
        self.segment_started_at.is_some()
    }

    /// Open a segment at `now`. Returns false if one is already open.
    pub fn open_segment(&mut self, now: DateTime<Utc>) -> bool {
        if self.segment_started_at.is_some() {
            return false;
        }
        self.segment_started_at = Some(now);
        true
    }

    /// Fold the open segment into the committed total and close it.
    ///
    /// Returns the seconds the segment contributed (0 if none was open).
    pub fn commit_segment(&mut self, now: DateTime<Utc>) -> u64 {
        let Some(started_at) = self.segment_started_at.take() else {
            return 0;
        };
        let segment_secs = whole_seconds_between(started_at, now);
        self.accumulated_secs = self.accumulated_secs.saturating_add(segment_secs);
        segment_secs
    }

    /// Committed time plus the open segment's live duration. Idempotent.
    pub fn live_elapsed(&self, now: DateTime<Utc>) -> u64 {
        let open = self
            .segment_started_at
            .map(|started_at| whole_seconds_between(started_at, now))
            .unwrap_or(0);
        self.accumulated_secs.saturating_add(open)
    }

    /// Drop all time and any open segment
    pub fn discard(&mut self) {
        self.accumulated_secs = 0;
        self.segment_started_at = None;
    }
}
