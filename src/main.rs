//! study-timer
//!
//! Crash-safe timer for study and mock-exam sessions. Time survives restarts
//! through a local snapshot and is mirrored to a remote status store so other
//! devices can see the running session.

mod clock;
mod config;
mod engine;
mod history;
mod logging;
mod session;
mod store;
mod sync;
mod timer;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use clock::{Clock, SystemClock};
use config::Config;
use engine::{
    create_engine_channels, EngineCommand, EngineEvent, EnginePorts, EngineRunner,
    EngineSettings, EngineStatus, RunOutcome, RunnerIntervals, TimerEngine,
};
use history::HistoryLog;
use session::{Session, SessionKind};
use store::{FileSnapshotStore, SnapshotKey, SnapshotStore};
use sync::{HttpStatusSink, NullPublisher, QueuedPublisher, StatusPublisher};
use ui::{format_clock, spawn_command_reader, TerminalSurface};

/// How long to wait for queued remote updates on exit
const PUBLISH_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// crash-safe study and mock-exam timer
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// also print logs to stderr
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// run a session in this terminal (resumes a recoverable one)
    Run {
        #[clap(short, long, value_enum, default_value_t = KindArg::Study)]
        kind: KindArg,

        /// subject or exam title
        #[clap(short, long)]
        label: String,

        /// count down from this many minutes instead of counting up
        #[clap(short, long)]
        minutes: Option<u64>,

        /// owner id to use instead of the configured one
        #[clap(long)]
        owner: Option<String>,
    },
    /// show the stored snapshot for a session kind
    Status {
        #[clap(short, long, value_enum, default_value_t = KindArg::Study)]
        kind: KindArg,

        #[clap(long)]
        owner: Option<String>,
    },
    /// throw away the stored snapshot for a session kind
    Discard {
        #[clap(short, long, value_enum, default_value_t = KindArg::Study)]
        kind: KindArg,

        #[clap(long)]
        owner: Option<String>,
    },
    /// list completed sessions
    History {
        /// only the most recent N records
        #[clap(short = 'n', long)]
        last: Option<usize>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum KindArg {
    Study,
    Exam,
}

impl From<KindArg> for SessionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Study => SessionKind::StudySession,
            KindArg::Exam => SessionKind::ExamSession,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = match logging::init_logging(cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            None
        }
    };

    info!("study-timer starting...");

    let config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path());

    match cli.command {
        Command::Run {
            kind,
            label,
            minutes,
            owner,
        } => {
            let owner_id = owner.unwrap_or_else(|| config.owner_id());
            let session = match minutes {
                Some(minutes) if minutes > 0 => {
                    Session::bounded(kind.into(), label, owner_id, minutes * 60)
                }
                _ => Session::open_ended(kind.into(), label, owner_id),
            };
            run_session(&config, session)
        }
        Command::Status { kind, owner } => {
            let owner_id = owner.unwrap_or_else(|| config.owner_id());
            print_status(&config, SnapshotKey::new(owner_id, kind.into()))
        }
        Command::Discard { kind, owner } => {
            let owner_id = owner.unwrap_or_else(|| config.owner_id());
            discard_session(&config, SnapshotKey::new(owner_id, kind.into()))
        }
        Command::History { last } => print_history(&config, last),
    }
}

fn run_session(config: &Config, session: Session) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let store = Arc::new(FileSnapshotStore::new(config.state_directory()?));
        let queued = build_publisher(config)?;
        let publisher: Arc<dyn StatusPublisher> = match &queued {
            Some(queued) => queued.clone() as Arc<dyn StatusPublisher>,
            None => Arc::new(NullPublisher),
        };

        let ports = EnginePorts {
            store,
            publisher,
            surface: Arc::new(TerminalSurface::new(session.label.clone())),
            clock: Arc::new(SystemClock),
        };
        let engine = Arc::new(TimerEngine::new(session, ports, EngineSettings::from(config)));

        let (cmd_tx, cmd_rx) = create_engine_channels();
        let runner = EngineRunner::new(engine.clone(), cmd_rx, RunnerIntervals::from(config));

        // Set up Ctrl+C handler that sends shutdown command
        let ctrl_c_tx = cmd_tx.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received, shutting down...");
            let _ = ctrl_c_tx.try_send(EngineCommand::Shutdown);
        })
        .context("Failed to install Ctrl+C handler")?;

        println!(
            "{} '{}': type pause, resume, stop, cancel or quit",
            engine.session().kind,
            engine.session().label
        );
        cmd_tx
            .send(EngineCommand::Start)
            .await
            .context("Engine runner is not accepting commands")?;
        spawn_command_reader(cmd_tx);
        spawn_lead_in_printer(&engine);

        let outcome = runner.run().await;
        println!();

        match outcome {
            RunOutcome::Completed(record) => {
                println!(
                    "Completed '{}': {} min",
                    record.label, record.duration_minutes
                );
                let history = HistoryLog::new(config.history_file()?);
                match history.append(&record) {
                    Ok(()) => info!("Recorded '{}' in {:?}", record.label, history.path()),
                    Err(e) => error!("Failed to record completed session: {:#}", e),
                }
            }
            RunOutcome::Cancelled => println!("Session discarded"),
            RunOutcome::Suspended if engine.is_timed_up() => {
                println!("Time is up; run the same command again to stop or cancel")
            }
            RunOutcome::Suspended => {
                let state = if engine.is_running() {
                    "still counting while away"
                } else {
                    "paused"
                };
                println!(
                    "Session saved at {} ({}); run the same command again to resume",
                    format_clock(engine.display_seconds()),
                    state
                );
            }
        }

        if let Some(queued) = queued {
            queued.flush(PUBLISH_FLUSH_TIMEOUT).await;
        }

        Ok::<_, anyhow::Error>(())
    })?;

    info!("Shutdown complete");
    Ok(())
}

/// Show the lead-in countdown, which the status surface does not render
fn spawn_lead_in_printer(engine: &TimerEngine) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::Status(EngineStatus::Preparing { lead_in_remaining })) => {
                    print!("\r\x1b[2KStarting in {}...", lead_in_remaining);
                    let _ = std::io::Write::flush(&mut std::io::stdout());
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn build_publisher(config: &Config) -> Result<Option<Arc<QueuedPublisher>>> {
    let Some(endpoint) = config.sync.endpoint.as_deref() else {
        info!("No sync endpoint configured, remote status disabled");
        return Ok(None);
    };

    let sink = HttpStatusSink::new(
        endpoint,
        Duration::from_secs(config.sync.request_timeout_secs),
    )?;
    info!("Publishing remote status to {}", endpoint);
    Ok(Some(Arc::new(QueuedPublisher::spawn(Arc::new(sink)))))
}

fn print_status(config: &Config, key: SnapshotKey) -> Result<()> {
    let store = FileSnapshotStore::new(config.state_directory()?);
    let Some(snapshot) = store.load(&key)? else {
        println!("No stored {} session", key.kind);
        return Ok(());
    };

    let mut elapsed = snapshot.accumulated_seconds;
    let state = if snapshot.finished {
        "time up"
    } else if snapshot.desired_running {
        // A running snapshot keeps counting while no process is attached
        elapsed += timer::whole_seconds_between(snapshot.last_written_at, SystemClock.now());
        "running (detached)"
    } else {
        "paused"
    };

    println!("{} '{}': {}", key.kind, snapshot.label, state);
    match snapshot.target_seconds {
        Some(target) => println!(
            "  {} of {} used, {} left",
            format_clock(elapsed.min(target)),
            format_clock(target),
            format_clock(target.saturating_sub(elapsed))
        ),
        None => println!("  {} elapsed", format_clock(elapsed)),
    }
    println!("  last saved {}", snapshot.last_written_at.to_rfc3339());
    Ok(())
}

fn discard_session(config: &Config, key: SnapshotKey) -> Result<()> {
    let store = FileSnapshotStore::new(config.state_directory()?);
    if store.load(&key).ok().flatten().is_none() {
        println!("No stored {} session", key.kind);
    }
    store.delete(&key)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(async {
        match build_publisher(config)? {
            Some(queued) => {
                queued.retract(&key);
                queued.flush(PUBLISH_FLUSH_TIMEOUT).await;
            }
            None => debug!("Sync disabled, nothing to retract"),
        }
        Ok::<_, anyhow::Error>(())
    })?;

    info!("Discarded snapshot for {}", key);
    println!("Discarded {} session", key.kind);
    Ok(())
}

fn print_history(config: &Config, last: Option<usize>) -> Result<()> {
    let history = HistoryLog::new(config.history_file()?);
    let records = history.read_all()?;
    if records.is_empty() {
        println!("No completed sessions yet");
        return Ok(());
    }

    let skip = last.map_or(0, |n| records.len().saturating_sub(n));
    for record in records.iter().skip(skip) {
        println!(
            "{}  {:<5}  {:>4} min  {}",
            record.ended_at.format("%Y-%m-%d %H:%M"),
            record.kind.as_str(),
            record.duration_minutes,
            record.label
        );
    }
    Ok(())
}
