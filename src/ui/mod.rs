//! External status surface
//!
//! Mirrors engine status onto OS-level indicators and feeds commands from
//! those indicators back into the engine.

mod terminal;

pub use terminal::{spawn_command_reader, TerminalSurface};

/// Sink for engine status, e.g. a window title or media control surface
pub trait StatusSurface: Send + Sync {
    /// Show the current run state and displayed time
    fn reflect(&self, running: bool, display_seconds: u64);

    /// Announce that a bounded session ran out of time
    fn time_up(&self, label: &str);

    /// The session is over; remove any indicators
    fn clear(&self);
}

/// Commands a status surface can issue. Handled exactly like the
/// equivalent dashboard command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalCommand {
    Play,
    Pause,
    Stop,
}

/// Format seconds as `H:MM:SS`, or `MM:SS` under an hour
pub fn format_clock(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
pub use test_support::RecordingSurface;

#[cfg(test)]
mod test_support {
    use super::StatusSurface;
    use std::sync::Mutex;

    /// Surface that records what it was asked to show
    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        pub reflections: Mutex<Vec<(bool, u64)>>,
        pub time_ups: Mutex<Vec<String>>,
        pub clears: Mutex<usize>,
    }

    impl RecordingSurface {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn last_reflection(&self) -> Option<(bool, u64)> {
            self.reflections.lock().unwrap().last().copied()
        }

        pub fn time_up_count(&self) -> usize {
            self.time_ups.lock().unwrap().len()
        }

        pub fn clear_count(&self) -> usize {
            *self.clears.lock().unwrap()
        }
    }

    impl StatusSurface for RecordingSurface {
        fn reflect(&self, running: bool, display_seconds: u64) {
            self.reflections.lock().unwrap().push((running, display_seconds));
        }

        fn time_up(&self, label: &str) {
            self.time_ups.lock().unwrap().push(label.to_string());
        }

        fn clear(&self) {
            *self.clears.lock().unwrap() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(75), "01:15");
        assert_eq!(format_clock(3600), "1:00:00");
        assert_eq!(format_clock(5 * 3600 + 62), "5:01:02");
    }
}
