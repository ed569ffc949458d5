//! Session timer engine
//!
//! [`TimerEngine`] is the state machine and owns the local snapshot,
//! remote publisher and status surface ports. [`EngineRunner`] drives it:
//! it serializes commands from the UI and status surface with the display
//! tick, the watchdog and the remote heartbeat.

mod facade;
mod recovery;
mod runner;
mod watchdog;

pub use facade::{
    EnginePorts, EngineSettings, FinishReason, Phase, TimerEngine, TransitionSource,
};
pub use runner::{create_engine_channels, EngineRunner, RunOutcome, RunnerIntervals};

use crate::session::CompletedSessionRecord;
use crate::ui::ExternalCommand;

/// Commands that can be sent to the engine runner
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Begin the session (after the lead-in)
    Start,
    /// Explicit pause from the dashboard
    Pause,
    /// Explicit resume from the dashboard
    Resume,
    /// Finalize and produce a completed-session record
    Stop,
    /// Discard the session
    Cancel,
    /// Command issued from the external status surface
    External(ExternalCommand),
    /// An outside agent stopped the timer without the user asking
    Interrupt,
    /// Persist state and exit, leaving the session recoverable
    Shutdown,
}

/// Status updates from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// Session created, not started
    Idle,
    /// Lead-in countdown before the first segment
    Preparing { lead_in_remaining: u64 },
    /// A segment is open
    Running { display_seconds: u64 },
    /// No segment is open
    Paused { display_seconds: u64 },
    /// Bounded session ran out; only stop or cancel remain
    TimedUp,
    Finished(FinishReason),
}

/// Events broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Status(EngineStatus),
    /// One-shot, delivered at most once per session
    TimeUp { label: String },
    Completed(CompletedSessionRecord),
}
