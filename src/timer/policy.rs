//! Mode policy: count-up vs countdown display and the one-shot time-up latch

use crate::session::TimerMode;

/// Interprets live elapsed time according to the session's timing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    mode: TimerMode,
}

impl ModePolicy {
    pub fn new(mode: TimerMode) -> Self {
        Self { mode }
    }

    /// Seconds left before time-up, `None` for open-ended sessions
    pub fn remaining(&self, live_elapsed: u64) -> Option<u64> {
        self.mode
            .target_seconds()
            .map(|target| target.saturating_sub(live_elapsed))
    }

    /// Value shown to the user: elapsed for open-ended, remaining for bounded
    pub fn display_seconds(&self, live_elapsed: u64) -> u64 {
        self.remaining(live_elapsed).unwrap_or(live_elapsed)
    }

    /// True once a bounded session has no time left. Never true for open-ended.
    pub fn is_exhausted(&self, live_elapsed: u64) -> bool {
        self.remaining(live_elapsed) == Some(0)
    }

    /// Elapsed time as it should be reported on completion.
    /// Bounded sessions never report more than their target.
    pub fn reported_elapsed(&self, live_elapsed: u64) -> u64 {
        match self.mode.target_seconds() {
            Some(target) => live_elapsed.min(target),
            None => live_elapsed,
        }
    }
}

/// Fires at most once per session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeUpLatch {
    fired: bool,
}

impl TimeUpLatch {
    /// Latch that has already fired (a recovered timed-up session)
    pub fn fired() -> Self {
        Self { fired: true }
    }

    /// Returns true the first time it is called, false on every later call
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_ended_counts_up() {
        let policy = ModePolicy::new(TimerMode::OpenEnded);
        assert_eq!(policy.display_seconds(125), 125);
        assert_eq!(policy.remaining(125), None);
        assert!(!policy.is_exhausted(u64::MAX));
    }

    #[test]
    fn test_bounded_counts_down_and_saturates() {
        let policy = ModePolicy::new(TimerMode::Bounded { target_seconds: 5 });
        assert_eq!(policy.display_seconds(3), 2);
        assert!(!policy.is_exhausted(4));
        assert_eq!(policy.display_seconds(9), 0);
        assert!(policy.is_exhausted(5));
        assert_eq!(policy.reported_elapsed(9), 5);
    }

    #[test]
    fn test_latch_fires_once() {
        let mut latch = TimeUpLatch::default();
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(!latch.fire());
        assert!(!TimeUpLatch::fired().fire());
    }
}
