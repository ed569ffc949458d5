use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_BASENAME: &str = "study-timer.log";
const LOG_DIR_ENV: &str = "STUDY_TIMER_LOG_PATH";
const LOG_RETENTION_DAYS: u64 = 7;

/// Log to a daily rolling file. Stdout belongs to the status line, so
/// nothing is written to the terminal unless `echo_stderr` is set.
pub fn init_logging(echo_stderr: bool) -> Result<WorkerGuard> {
    let log_dir = resolve_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    prune_old_logs(
        &log_dir,
        Duration::from_secs(60 * 60 * 24 * LOG_RETENTION_DAYS),
    );

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_BASENAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let stderr_layer = echo_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(guard)
}

fn resolve_log_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(LOG_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let proj_dirs = ProjectDirs::from("dev", "study-timer", "study-timer")
        .context("Failed to determine project directories for log path")?;

    #[cfg(target_os = "windows")]
    {
        return Ok(proj_dirs.data_local_dir().join("Logs"));
    }

    #[cfg(not(target_os = "windows"))]
    {
        let base = proj_dirs
            .state_dir()
            .unwrap_or_else(|| proj_dirs.data_local_dir());
        Ok(base.join("logs"))
    }
}

fn prune_old_logs(log_dir: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        // Only our own rotated files
        if !file_name.starts_with(LOG_FILE_BASENAME) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };

        if modified < cutoff {
            let _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_only_touches_expired_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let ours = dir.path().join(format!("{}.2026-10-01", LOG_FILE_BASENAME));
        let other = dir.path().join("notes.txt");
        std::fs::write(&ours, "log").unwrap();
        std::fs::write(&other, "keep").unwrap();

        // Nothing is older than a day yet
        prune_old_logs(dir.path(), Duration::from_secs(60 * 60 * 24));
        assert!(ours.exists());
        assert!(other.exists());

        // With a zero max age every log file is already expired
        std::thread::sleep(Duration::from_millis(20));
        prune_old_logs(dir.path(), Duration::ZERO);
        assert!(!ours.exists());
        assert!(other.exists());
    }
}
