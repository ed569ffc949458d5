//! Engine facade
//!
//! The public command and observation surface for one session. All state
//! transitions happen under a single mutex, so the display tick, the
//! watchdog and user commands never interleave.
//!
//! Every transition writes the local snapshot first, then hands the same
//! snapshot to the remote publisher and refreshes the status surface.
//! Neither output can fail a command: persistence and sync errors are
//! logged and the in-memory transition stands.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use super::recovery::{self, Recovered};
use super::watchdog::{self, WatchdogAction, WatchdogObservation};
use super::{EngineEvent, EngineStatus};
use crate::clock::Clock;
use crate::config::Config;
use crate::session::{duration_minutes, CompletedSessionRecord, Session};
use crate::store::{Snapshot, SnapshotKey, SnapshotStore};
use crate::sync::StatusPublisher;
use crate::timer::{Accumulator, ModePolicy, TimeUpLatch};
use crate::ui::StatusSurface;

/// Injected collaborators
#[derive(Clone)]
pub struct EnginePorts {
    /// Durable local snapshot store (required)
    pub store: Arc<dyn SnapshotStore>,
    /// Best-effort remote status publisher
    pub publisher: Arc<dyn StatusPublisher>,
    pub surface: Arc<dyn StatusSurface>,
    pub clock: Arc<dyn Clock>,
}

/// Timing policy knobs
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub lead_in: Duration,
    pub watchdog_debounce: Duration,
    pub max_credited_gap_secs: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lead_in: Duration::seconds(3),
            watchdog_debounce: Duration::milliseconds(1200),
            max_credited_gap_secs: None,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            lead_in: Duration::seconds(config.timer.lead_in_secs as i64),
            watchdog_debounce: Duration::milliseconds(config.timer.watchdog_debounce_ms as i64),
            max_credited_gap_secs: config.recovery.max_credited_gap_secs,
        }
    }
}

/// Who asked for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSource {
    /// The dashboard UI
    User,
    /// The external status surface (media keys, title bar controls)
    External,
    Watchdog,
    TimeUp,
}

impl TransitionSource {
    /// Explicit toggles reset the watchdog debounce window
    fn is_explicit(self) -> bool {
        matches!(self, TransitionSource::User | TransitionSource::External)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stopped,
    Cancelled,
}

/// Externally visible state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preparing,
    Running,
    Paused,
    TimedUp,
    Finished(FinishReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Preparing,
    /// Started; running or paused depending on the accumulator
    Active,
    TimedUp,
    Finished(FinishReason),
}

#[derive(Debug)]
struct EngineState {
    stage: Stage,
    accumulator: Accumulator,
    /// The user's last explicit intent
    desired_running: bool,
    /// Set by `start()` while the lead-in counts down
    lead_in_ends_at: Option<DateTime<Utc>>,
    last_toggle_at: Option<DateTime<Utc>>,
    time_up: TimeUpLatch,
}

impl EngineState {
    fn from_recovered(recovered: Recovered, now: DateTime<Utc>) -> Self {
        let mut state = Self {
            stage: Stage::Preparing,
            accumulator: Accumulator::new(),
            desired_running: false,
            lead_in_ends_at: None,
            last_toggle_at: None,
            time_up: TimeUpLatch::default(),
        };

        match recovered {
            Recovered::Fresh => {}
            Recovered::Paused { accumulated_secs } => {
                state.stage = Stage::Active;
                state.accumulator = Accumulator::with_accumulated(accumulated_secs);
            }
            Recovered::Running { accumulated_secs } => {
                state.stage = Stage::Active;
                state.accumulator = Accumulator::with_accumulated(accumulated_secs);
                state.accumulator.open_segment(now);
                state.desired_running = true;
            }
            Recovered::TimedUp { accumulated_secs } => {
                state.stage = Stage::TimedUp;
                state.accumulator = Accumulator::with_accumulated(accumulated_secs);
                state.time_up = TimeUpLatch::fired();
            }
        }

        state
    }
}

/// Timer engine for a single session
pub struct TimerEngine {
    session: Session,
    key: SnapshotKey,
    policy: ModePolicy,
    settings: EngineSettings,
    ports: EnginePorts,
    state: Mutex<EngineState>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl TimerEngine {
    /// Create the engine, recovering any snapshot left by an earlier process
    pub fn new(session: Session, ports: EnginePorts, settings: EngineSettings) -> Self {
        let key = SnapshotKey::new(session.owner_id.clone(), session.kind);
        let policy = ModePolicy::new(session.mode);
        let now = ports.clock.now();

        let recovered = recovery::recover(
            ports.store.as_ref(),
            &key,
            &session,
            now,
            settings.max_credited_gap_secs,
        );
        let (events_tx, _) = broadcast::channel(64);

        let engine = Self {
            session,
            key,
            policy,
            settings,
            ports,
            state: Mutex::new(EngineState::from_recovered(recovered, now)),
            events_tx,
        };

        if recovered != Recovered::Fresh {
            let mut state = engine.lock();
            engine.observe_locked(&mut state, now);
            engine.commit_transition_locked(&state, now);
        }

        engine
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        // A panic mid-transition leaves state that is still internally valid
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.ports.clock.now()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Subscribe to status, time-up and completion events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    // ----- commands -----

    /// Begin the session. With a lead-in the first segment opens once the
    /// lead-in has elapsed (observed by `tick`).
    pub fn start(&self) {
        let now = self.now();
        let mut state = self.lock();

        if state.stage != Stage::Preparing || state.lead_in_ends_at.is_some() {
            debug!("Ignoring start: session already started");
            return;
        }

        state.last_toggle_at = Some(now);
        if self.settings.lead_in <= Duration::zero() {
            self.begin_running_locked(&mut state, now, now);
        } else {
            state.lead_in_ends_at = Some(now + self.settings.lead_in);
            info!(
                "Starting {} '{}' after {}s lead-in",
                self.session.kind,
                self.session.label,
                self.settings.lead_in.num_seconds()
            );
            self.emit_status_locked(&state, now);
        }
    }

    pub fn pause(&self, source: TransitionSource) {
        let now = self.now();
        let mut state = self.lock();
        self.observe_locked(&mut state, now);

        if source == TransitionSource::Watchdog {
            debug!("Ignoring pause from watchdog");
            return;
        }
        // Also accepted while interrupted, so the watchdog won't undo the user's pause
        if state.stage != Stage::Active || !state.desired_running {
            debug!("Ignoring pause from {:?}: not running", source);
            return;
        }

        self.pause_locked(&mut state, now, source);
        self.commit_transition_locked(&state, now);
    }

    pub fn resume(&self, source: TransitionSource) {
        let now = self.now();
        let mut state = self.lock();
        self.observe_locked(&mut state, now);

        if state.stage != Stage::Active || state.accumulator.is_open() {
            debug!("Ignoring resume from {:?}: not paused", source);
            return;
        }

        self.resume_locked(&mut state, now, source);
        self.commit_transition_locked(&state, now);
    }

    /// Finalize the session. Returns `None` if it was never started or is
    /// already finished.
    pub fn stop(&self) -> Option<CompletedSessionRecord> {
        let now = self.now();
        let mut state = self.lock();
        self.observe_locked(&mut state, now);

        if !matches!(state.stage, Stage::Active | Stage::TimedUp) {
            debug!("Ignoring stop: session not started or already finished");
            return None;
        }

        state.accumulator.commit_segment(now);
        state.desired_running = false;
        state.stage = Stage::Finished(FinishReason::Stopped);

        let elapsed_secs = self
            .policy
            .reported_elapsed(state.accumulator.accumulated_secs());
        let record = CompletedSessionRecord {
            kind: self.session.kind,
            label: self.session.label.clone(),
            duration_minutes: duration_minutes(elapsed_secs),
            ended_at: now,
        };

        info!(
            "Stopped {} '{}' after {}s ({} min)",
            self.session.kind, self.session.label, elapsed_secs, record.duration_minutes
        );

        self.clear_outputs_locked();
        let _ = self.events_tx.send(EngineEvent::Completed(record.clone()));
        self.emit_status_locked(&state, now);

        Some(record)
    }

    /// Discard the session. Legal in every state except finished.
    pub fn cancel(&self) {
        let now = self.now();
        let mut state = self.lock();

        if matches!(state.stage, Stage::Finished(_)) {
            debug!("Ignoring cancel: session already finished");
            return;
        }

        let discarded = state.accumulator.live_elapsed(now);
        state.accumulator.discard();
        state.desired_running = false;
        state.lead_in_ends_at = None;
        state.stage = Stage::Finished(FinishReason::Cancelled);

        info!(
            "Cancelled {} '{}' ({}s discarded)",
            self.session.kind, self.session.label, discarded
        );

        self.clear_outputs_locked();
        self.emit_status_locked(&state, now);
    }

    /// Route a command from the external status surface
    pub fn handle_external(&self, cmd: crate::ui::ExternalCommand) -> Option<CompletedSessionRecord> {
        use crate::ui::ExternalCommand;

        match cmd {
            ExternalCommand::Play => {
                if self.phase() == Phase::Preparing {
                    self.start();
                } else {
                    self.resume(TransitionSource::External);
                }
                None
            }
            ExternalCommand::Pause => {
                self.pause(TransitionSource::External);
                None
            }
            ExternalCommand::Stop => self.stop(),
        }
    }

    /// An outside agent stopped the timer. The segment is committed but the
    /// user's intent stays "running", leaving the drift for the watchdog.
    pub fn interrupt(&self) {
        let now = self.now();
        let mut state = self.lock();
        self.observe_locked(&mut state, now);

        if state.stage != Stage::Active || !state.accumulator.is_open() {
            return;
        }

        let segment_secs = state.accumulator.commit_segment(now);
        warn!(
            "Timer for '{}' interrupted externally after a {}s segment",
            self.session.label, segment_secs
        );
        self.commit_transition_locked(&state, now);
    }

    // ----- periodic activities -----

    /// Display tick: re-derive time, fire time-up, write the snapshot
    pub fn tick(&self) -> EngineStatus {
        let now = self.now();
        let mut state = self.lock();
        self.observe_locked(&mut state, now);

        if state.stage == Stage::Active && state.accumulator.is_open() {
            self.persist_locked(&state, now);
        }
        self.reflect_locked(&state, now);

        let status = self.status_locked(&state, now);
        trace!("Tick: {:?}", status);
        let _ = self.events_tx.send(EngineEvent::Status(status.clone()));
        status
    }

    /// One watchdog cycle. Returns true if it reopened a segment.
    pub fn run_watchdog(&self) -> bool {
        let now = self.now();
        let mut state = self.lock();
        self.observe_locked(&mut state, now);

        let observation = WatchdogObservation {
            active: state.stage == Stage::Active,
            desired_running: state.desired_running,
            segment_open: state.accumulator.is_open(),
            exhausted: self
                .policy
                .is_exhausted(state.accumulator.live_elapsed(now)),
            since_last_toggle: state.last_toggle_at.map(|at| now - at),
        };

        match watchdog::evaluate(&observation, self.settings.watchdog_debounce) {
            WatchdogAction::Resume => {
                info!(
                    "Watchdog: '{}' should be running but is stopped, resuming",
                    self.session.label
                );
                self.resume_locked(&mut state, now, TransitionSource::Watchdog);
                self.commit_transition_locked(&state, now);
                true
            }
            WatchdogAction::Skip(reason) => {
                trace!("Watchdog idle: {:?}", reason);
                false
            }
        }
    }

    /// Heartbeat: republish current status so remote readers see it is alive
    pub fn heartbeat(&self) {
        let now = self.now();
        let state = self.lock();
        if matches!(state.stage, Stage::Active | Stage::TimedUp) {
            debug!("Heartbeat for '{}'", self.session.label);
            self.publish_locked(&state, now);
        }
    }

    /// Write the snapshot without changing state (e.g. before shutdown)
    pub fn persist(&self) {
        let now = self.now();
        let state = self.lock();
        if matches!(state.stage, Stage::Active | Stage::TimedUp) {
            self.persist_locked(&state, now);
        }
    }

    // ----- observation -----

    /// Seconds to show: elapsed for open-ended, remaining for bounded
    pub fn display_seconds(&self) -> u64 {
        let now = self.now();
        let state = self.lock();
        self.display_seconds_locked(&state, now)
    }

    /// True while a segment is open
    pub fn is_running(&self) -> bool {
        self.lock().accumulator.is_open()
    }

    /// True after stop or cancel
    pub fn is_finished(&self) -> bool {
        matches!(self.lock().stage, Stage::Finished(_))
    }

    pub fn is_timed_up(&self) -> bool {
        self.lock().stage == Stage::TimedUp
    }

    pub fn phase(&self) -> Phase {
        let state = self.lock();
        match state.stage {
            Stage::Preparing => Phase::Preparing,
            Stage::Active if state.accumulator.is_open() => Phase::Running,
            Stage::Active => Phase::Paused,
            Stage::TimedUp => Phase::TimedUp,
            Stage::Finished(reason) => Phase::Finished(reason),
        }
    }

    pub fn status(&self) -> EngineStatus {
        let now = self.now();
        let state = self.lock();
        self.status_locked(&state, now)
    }

    // ----- internals (caller holds the lock) -----

    /// Apply everything that follows from time passing: lead-in completion
    /// and bounded time-up. Remaining time is re-derived here on every
    /// observation rather than scheduled.
    fn observe_locked(&self, state: &mut EngineState, now: DateTime<Utc>) {
        if state.stage == Stage::Preparing {
            if let Some(ends_at) = state.lead_in_ends_at {
                if now >= ends_at {
                    self.begin_running_locked(state, ends_at, now);
                }
            }
        }

        if state.stage == Stage::Active
            && self
                .policy
                .is_exhausted(state.accumulator.live_elapsed(now))
        {
            self.time_up_locked(state, now);
        }
    }

    fn begin_running_locked(&self, state: &mut EngineState, opened_at: DateTime<Utc>, now: DateTime<Utc>) {
        state.stage = Stage::Active;
        state.lead_in_ends_at = None;
        state.accumulator.open_segment(opened_at);
        state.desired_running = true;

        info!("Started {} '{}'", self.session.kind, self.session.label);
        self.commit_transition_locked(state, now);
    }

    fn pause_locked(&self, state: &mut EngineState, now: DateTime<Utc>, source: TransitionSource) {
        let segment_secs = state.accumulator.commit_segment(now);
        state.desired_running = false;
        if source.is_explicit() {
            state.last_toggle_at = Some(now);
        }
        info!(
            "Paused '{}' ({:?}) after a {}s segment, {}s total",
            self.session.label,
            source,
            segment_secs,
            state.accumulator.accumulated_secs()
        );
    }

    fn resume_locked(&self, state: &mut EngineState, now: DateTime<Utc>, source: TransitionSource) {
        state.accumulator.open_segment(now);
        state.desired_running = true;
        if source.is_explicit() {
            state.last_toggle_at = Some(now);
        }
        info!("Resumed '{}' ({:?})", self.session.label, source);
    }

    /// Bounded session ran out: auto-pause, notify once, wait for stop/cancel
    fn time_up_locked(&self, state: &mut EngineState, now: DateTime<Utc>) {
        if state.accumulator.is_open() {
            self.pause_locked(state, now, TransitionSource::TimeUp);
        }
        state.desired_running = false;
        state.stage = Stage::TimedUp;

        if state.time_up.fire() {
            info!("Time is up for '{}'", self.session.label);
            let _ = self.events_tx.send(EngineEvent::TimeUp {
                label: self.session.label.clone(),
            });
            self.ports.surface.time_up(&self.session.label);
        }

        self.commit_transition_locked(state, now);
    }

    /// Local snapshot, then remote publish, then surface and subscribers
    fn commit_transition_locked(&self, state: &EngineState, now: DateTime<Utc>) {
        self.persist_locked(state, now);
        self.publish_locked(state, now);
        self.reflect_locked(state, now);
        self.emit_status_locked(state, now);
    }

    fn snapshot_locked(&self, state: &EngineState, now: DateTime<Utc>) -> Snapshot {
        Snapshot {
            accumulated_seconds: state.accumulator.live_elapsed(now),
            desired_running: state.desired_running,
            finished: state.stage == Stage::TimedUp,
            last_written_at: now,
            target_seconds: self.session.mode.target_seconds(),
            mode: self.session.mode.tag(),
            label: self.session.label.clone(),
        }
    }

    fn persist_locked(&self, state: &EngineState, now: DateTime<Utc>) {
        let snapshot = self.snapshot_locked(state, now);
        if let Err(e) = self.ports.store.save(&self.key, &snapshot) {
            // The in-memory transition stays authoritative for this process
            warn!("Failed to persist snapshot for {}: {}", self.key, e);
        }
    }

    fn publish_locked(&self, state: &EngineState, now: DateTime<Utc>) {
        let snapshot = self.snapshot_locked(state, now);
        self.ports.publisher.publish(&self.key, &snapshot);
    }

    fn clear_outputs_locked(&self) {
        if let Err(e) = self.ports.store.delete(&self.key) {
            warn!("Failed to delete snapshot for {}: {}", self.key, e);
        }
        self.ports.publisher.retract(&self.key);
        self.ports.surface.clear();
    }

    fn reflect_locked(&self, state: &EngineState, now: DateTime<Utc>) {
        match state.stage {
            Stage::Active | Stage::TimedUp => {
                let display = self.display_seconds_locked(state, now);
                self.ports
                    .surface
                    .reflect(state.accumulator.is_open(), display);
            }
            Stage::Preparing | Stage::Finished(_) => {}
        }
    }

    fn emit_status_locked(&self, state: &EngineState, now: DateTime<Utc>) {
        let status = self.status_locked(state, now);
        let _ = self.events_tx.send(EngineEvent::Status(status));
    }

    fn display_seconds_locked(&self, state: &EngineState, now: DateTime<Utc>) -> u64 {
        self.policy
            .display_seconds(state.accumulator.live_elapsed(now))
    }

    fn status_locked(&self, state: &EngineState, now: DateTime<Utc>) -> EngineStatus {
        match state.stage {
            Stage::Preparing => match state.lead_in_ends_at {
                Some(ends_at) => {
                    let remaining_ms = (ends_at - now).num_milliseconds().max(0) as u64;
                    EngineStatus::Preparing {
                        lead_in_remaining: remaining_ms.div_ceil(1000),
                    }
                }
                None => EngineStatus::Idle,
            },
            Stage::Active => {
                let display_seconds = self.display_seconds_locked(state, now);
                if state.accumulator.is_open() {
                    EngineStatus::Running { display_seconds }
                } else {
                    EngineStatus::Paused { display_seconds }
                }
            }
            Stage::TimedUp => EngineStatus::TimedUp,
            Stage::Finished(reason) => EngineStatus::Finished(reason),
        }
    }
}
