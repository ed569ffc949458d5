//! Engine runner
//!
//! Owns the command channel and the three periodic activities (display
//! tick, watchdog, remote heartbeat) and feeds them to the engine one at a
//! time from a single `select!` loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::facade::{TimerEngine, TransitionSource};
use super::EngineCommand;
use crate::config::Config;
use crate::session::CompletedSessionRecord;

/// Cadences for the periodic activities
#[derive(Debug, Clone, Copy)]
pub struct RunnerIntervals {
    pub tick: Duration,
    pub watchdog: Duration,
    pub heartbeat: Duration,
}

impl Default for RunnerIntervals {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1000),
            watchdog: Duration::from_millis(1500),
            heartbeat: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for RunnerIntervals {
    fn from(config: &Config) -> Self {
        Self {
            tick: Duration::from_millis(config.timer.tick_interval_ms.max(1)),
            watchdog: Duration::from_millis(config.timer.watchdog_interval_ms.max(1)),
            heartbeat: Duration::from_secs(config.timer.heartbeat_secs.max(1)),
        }
    }
}

/// How the runner loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Session stopped; the record is ready to be saved
    Completed(CompletedSessionRecord),
    Cancelled,
    /// Process is exiting with the session still recoverable
    Suspended,
}

/// Drives a [`TimerEngine`] until the session ends or shutdown is requested
pub struct EngineRunner {
    engine: Arc<TimerEngine>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    intervals: RunnerIntervals,
}

impl EngineRunner {
    pub fn new(
        engine: Arc<TimerEngine>,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        intervals: RunnerIntervals,
    ) -> Self {
        Self {
            engine,
            cmd_rx,
            intervals,
        }
    }

    pub async fn run(mut self) -> RunOutcome {
        info!(
            "Engine runner starting for {} '{}'",
            self.engine.session().kind,
            self.engine.session().label
        );

        let mut tick_timer = tokio::time::interval(self.intervals.tick);
        tick_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut watchdog_timer = tokio::time::interval(self.intervals.watchdog);
        watchdog_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Use interval_at to delay first heartbeat (transitions already publish)
        let mut heartbeat_timer =
            tokio::time::interval_at(Instant::now() + self.intervals.heartbeat, self.intervals.heartbeat);
        heartbeat_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("Command channel closed");
                        self.engine.persist();
                        break RunOutcome::Suspended;
                    };
                    if let Some(outcome) = self.handle_command(cmd) {
                        break outcome;
                    }
                }

                _ = tick_timer.tick() => {
                    self.engine.tick();
                }

                _ = watchdog_timer.tick() => {
                    self.engine.run_watchdog();
                }

                _ = heartbeat_timer.tick() => {
                    self.engine.heartbeat();
                }
            }
        };

        info!(
            "Engine runner stopped: {:?} (engine {:?})",
            outcome,
            self.engine.status()
        );
        outcome
    }

    fn handle_command(&self, cmd: EngineCommand) -> Option<RunOutcome> {
        debug!("Engine command: {:?}", cmd);
        match cmd {
            EngineCommand::Start => self.engine.start(),
            EngineCommand::Pause => self.engine.pause(TransitionSource::User),
            EngineCommand::Resume => self.engine.resume(TransitionSource::User),
            EngineCommand::Stop => {
                if let Some(record) = self.engine.stop() {
                    return Some(RunOutcome::Completed(record));
                }
            }
            EngineCommand::Cancel => self.engine.cancel(),
            EngineCommand::External(external) => {
                if let Some(record) = self.engine.handle_external(external) {
                    return Some(RunOutcome::Completed(record));
                }
            }
            EngineCommand::Interrupt => self.engine.interrupt(),
            EngineCommand::Shutdown => {
                info!("Shutdown command received");
                self.engine.persist();
                return Some(RunOutcome::Suspended);
            }
        }

        // Stop paths return above, so a finished engine here was cancelled
        self.engine.is_finished().then_some(RunOutcome::Cancelled)
    }
}

/// Create the command channel for the runner
pub fn create_engine_channels() -> (mpsc::Sender<EngineCommand>, mpsc::Receiver<EngineCommand>) {
    mpsc::channel(32)
}
