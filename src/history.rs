//! Completed-session history
//!
//! Each stopped session is appended to a JSON-lines file so the dashboard
//! (and the `history` subcommand) can list what was studied and for how long.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::session::CompletedSessionRecord;

pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&self, record: &CompletedSessionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create history directory: {:?}", parent))?;
        }

        let mut line = serde_json::to_string(record).context("Failed to serialize record")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file: {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to write history file: {:?}", self.path))?;

        debug!("Appended '{}' to {:?}", record.label, self.path);
        Ok(())
    }

    /// Read all records, oldest first. Lines that fail to parse are skipped.
    pub fn read_all(&self) -> Result<Vec<CompletedSessionRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open history file: {:?}", self.path))
            }
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read history file: {:?}", self.path))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed history line {}: {}", index + 1, e),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKind;
    use chrono::{TimeZone, Utc};

    fn record(label: &str, minutes: u64) -> CompletedSessionRecord {
        CompletedSessionRecord {
            kind: SessionKind::StudySession,
            label: label.to_string(),
            duration_minutes: minutes,
            ended_at: Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("completed.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("data").join("completed.jsonl"));

        log.append(&record("Statistics", 45)).unwrap();
        log.append(&record("History essay", 90)).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records, vec![record("Statistics", 45), record("History essay", 90)]);

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(raw.lines().next().unwrap().contains("\"durationMinutes\":45"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("completed.jsonl"));
        log.append(&record("Biology", 30)).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "{{not json").unwrap();
        drop(file);
        log.append(&record("Physics", 20)).unwrap();

        let labels: Vec<_> = log.read_all().unwrap().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["Biology", "Physics"]);
    }
}
