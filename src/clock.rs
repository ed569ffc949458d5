//! Wall-clock access
//!
//! Every timestamp the engine uses comes through [`Clock`], so elapsed time
//! can be derived from absolute instants and tests can drive time by hand.

use chrono::{DateTime, Utc};
#[cfg(test)]
use chrono::Duration;
#[cfg(test)]
use std::sync::Mutex;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `secs` whole seconds
    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance_secs(90);
        assert_eq!(clock.now() - start, Duration::seconds(90));

        clock.advance(Duration::milliseconds(500));
        assert_eq!((clock.now() - start).num_milliseconds(), 90_500);
    }
}
