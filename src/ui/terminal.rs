//! Terminal status surface
//!
//! Shows the timer in the terminal window title and on a status line, and
//! reads one-word commands from stdin.

use std::io::{BufRead, Write};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{format_clock, ExternalCommand, StatusSurface};
use crate::engine::EngineCommand;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IndicatorState {
    Running,
    Paused,
}

impl IndicatorState {
    fn symbol(&self) -> &'static str {
        match self {
            IndicatorState::Running => "▶",
            IndicatorState::Paused => "⏸",
        }
    }
}

/// Status surface writing to the controlling terminal
pub struct TerminalSurface {
    label: String,
    /// Last rendered line, to skip redundant writes
    last_line: Mutex<Option<String>>,
}

impl TerminalSurface {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_line: Mutex::new(None),
        }
    }

    fn write(&self, line: &str, title: &str) {
        let mut last = self.last_line.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_deref() == Some(line) {
            return;
        }

        let mut out = std::io::stdout().lock();
        // OSC 0 sets the window title; \r\x1b[2K rewrites the status line in place
        let result = write!(out, "\x1b]0;{}\x07\r\x1b[2K{}", title, line).and_then(|_| out.flush());
        if let Err(e) = result {
            debug!("Failed to write terminal status: {}", e);
            return;
        }
        *last = Some(line.to_string());
    }
}

impl StatusSurface for TerminalSurface {
    fn reflect(&self, running: bool, display_seconds: u64) {
        let state = if running {
            IndicatorState::Running
        } else {
            IndicatorState::Paused
        };
        let clock = format_clock(display_seconds);
        let line = format!("{} {}  {}", state.symbol(), clock, self.label);
        let title = format!("{} {} - {}", state.symbol(), clock, self.label);
        self.write(&line, &title);
    }

    fn time_up(&self, label: &str) {
        info!("Time is up for '{}'", label);
        let mut out = std::io::stdout().lock();
        // BEL for an audible cue
        let _ = writeln!(out, "\x07\nTime is up: {} (type 'stop' to save or 'cancel')", label);
        let _ = out.flush();
        let mut last = self.last_line.lock().unwrap_or_else(|e| e.into_inner());
        *last = None;
    }

    fn clear(&self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\x1b]0;\x07\r\x1b[2K");
        let _ = out.flush();
        let mut last = self.last_line.lock().unwrap_or_else(|e| e.into_inner());
        *last = None;
    }
}

/// Map one line of terminal input onto an engine command.
///
/// Plain words act like dashboard buttons. `play`, `hold` and `done` behave
/// like media keys on the status surface.
pub fn parse_command(input: &str) -> Option<EngineCommand> {
    match input.trim().to_ascii_lowercase().as_str() {
        "start" => Some(EngineCommand::Start),
        "pause" | "p" => Some(EngineCommand::Pause),
        "resume" | "r" => Some(EngineCommand::Resume),
        "stop" | "s" => Some(EngineCommand::Stop),
        "cancel" | "discard" => Some(EngineCommand::Cancel),
        "play" => Some(EngineCommand::External(ExternalCommand::Play)),
        "hold" => Some(EngineCommand::External(ExternalCommand::Pause)),
        "done" => Some(EngineCommand::External(ExternalCommand::Stop)),
        // Simulates the OS suspending the timer, to exercise the watchdog
        "interrupt" => Some(EngineCommand::Interrupt),
        "quit" | "q" | "exit" => Some(EngineCommand::Shutdown),
        _ => None,
    }
}

/// Read commands from stdin on a background thread
pub fn spawn_command_reader(cmd_tx: mpsc::Sender<EngineCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to read terminal input: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let Some(cmd) = parse_command(&line) else {
                warn!("Unknown command: {}", line.trim());
                continue;
            };

            debug!("Terminal command: {:?}", cmd);
            // Plain thread, so blocking_send is fine here
            if cmd_tx.blocking_send(cmd).is_err() {
                debug!("Engine stopped, terminal reader exiting");
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert!(matches!(parse_command(" Pause \n"), Some(EngineCommand::Pause)));
        assert!(matches!(parse_command("r"), Some(EngineCommand::Resume)));
        assert!(matches!(parse_command("s"), Some(EngineCommand::Stop)));
        assert!(matches!(
            parse_command("play"),
            Some(EngineCommand::External(ExternalCommand::Play))
        ));
        assert!(matches!(
            parse_command("HOLD"),
            Some(EngineCommand::External(ExternalCommand::Pause))
        ));
        assert!(matches!(
            parse_command("done"),
            Some(EngineCommand::External(ExternalCommand::Stop))
        ));
        assert!(matches!(parse_command("interrupt"), Some(EngineCommand::Interrupt)));
        assert!(matches!(parse_command("cancel"), Some(EngineCommand::Cancel)));
        assert!(matches!(parse_command("q"), Some(EngineCommand::Shutdown)));
        assert!(parse_command("faster").is_none());
    }
}
