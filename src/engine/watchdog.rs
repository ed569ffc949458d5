//! Run-state watchdog
//!
//! Reconciles the user's intent with the timer's actual state. An outside
//! agent can stop the timer without the user asking; the watchdog reopens
//! a segment in that case. It never overrides an explicit pause, never
//! revives a session with no time left, and only heals this engine's own
//! timer.

use chrono::Duration;

/// What the watchdog sees on one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogObservation {
    /// Session started and not timed up or finished
    pub active: bool,
    pub desired_running: bool,
    pub segment_open: bool,
    /// Bounded session with zero remaining
    pub exhausted: bool,
    /// Time since the last explicit start/pause/resume, if any
    pub since_last_toggle: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    PausedByUser,
    Exhausted,
    Debounced,
    Healthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Skip(SkipReason),
    Resume,
}

/// Decide whether this cycle should reopen a segment
pub fn evaluate(obs: &WatchdogObservation, debounce: Duration) -> WatchdogAction {
    if !obs.active {
        return WatchdogAction::Skip(SkipReason::Inactive);
    }
    if !obs.desired_running {
        return WatchdogAction::Skip(SkipReason::PausedByUser);
    }
    if obs.exhausted {
        return WatchdogAction::Skip(SkipReason::Exhausted);
    }
    if obs.since_last_toggle.is_some_and(|since| since < debounce) {
        return WatchdogAction::Skip(SkipReason::Debounced);
    }
    if obs.segment_open {
        return WatchdogAction::Skip(SkipReason::Healthy);
    }
    WatchdogAction::Resume
}
