//! Configuration management for study-timer

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Timer cadences and lead-in
    #[serde(default)]
    pub timer: TimerConfig,

    /// Where local state is kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote status publishing
    #[serde(default)]
    pub sync: SyncConfig,

    /// Crash/reload recovery policy
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Display tick interval (ms)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Watchdog reconciliation interval (ms)
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_ms: u64,

    /// Watchdog stays quiet this long after an explicit toggle (ms)
    #[serde(default = "default_watchdog_debounce")]
    pub watchdog_debounce_ms: u64,

    /// Remote status heartbeat (seconds)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    /// Countdown before the first segment opens (seconds, 0 to disable)
    #[serde(default = "default_lead_in")]
    pub lead_in_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for session snapshots (defaults to the platform state dir)
    pub state_directory: Option<PathBuf>,

    /// JSON-lines log of completed sessions (defaults to the platform data dir)
    pub history_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the remote status store; sync is off when unset
    pub endpoint: Option<String>,

    /// User identifier, generated on first run if not set
    pub owner_id: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Cap on time credited for an absence while a session was running.
    /// Unset credits the whole absence.
    pub max_credited_gap_secs: Option<u64>,
}

// Default value functions
fn default_tick_interval() -> u64 {
    1000
}

fn default_watchdog_interval() -> u64 {
    1500
}

fn default_watchdog_debounce() -> u64 {
    1200
}

fn default_heartbeat() -> u64 {
    30
}

fn default_lead_in() -> u64 {
    3
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            watchdog_interval_ms: default_watchdog_interval(),
            watchdog_debounce_ms: default_watchdog_debounce(),
            heartbeat_secs: default_heartbeat(),
            lead_in_secs: default_lead_in(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            owner_id: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "study-timer", "study-timer")
        .context("Failed to determine project directories")
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(config_path)
    }

    /// Load configuration from `config_path`, writing defaults if it is missing
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?
        } else {
            Config::default()
        };
        config.config_path = Some(config_path.clone());

        // First run (or an owner-less file): pin an owner ID so later runs recover the same sessions
        if config.sync.owner_id.is_none() || !config_path.exists() {
            config.sync.owner_id.get_or_insert_with(|| uuid::Uuid::new_v4().to_string());
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::default_config_path()?,
        };

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// The configured owner, or a throwaway one if none was ever set
    pub fn owner_id(&self) -> String {
        self.sync
            .owner_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Directory holding session snapshots
    pub fn state_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.state_directory {
            return Ok(dir.clone());
        }
        let dirs = project_dirs()?;
        let base = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
        Ok(base.join("snapshots"))
    }

    /// File receiving completed-session records
    pub fn history_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage.history_file {
            return Ok(path.clone());
        }
        Ok(project_dirs()?.data_dir().join("completed.jsonl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [timer]
            lead_in_secs = 0

            [sync]
            endpoint = "https://sync.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.timer.lead_in_secs, 0);
        assert_eq!(config.timer.tick_interval_ms, 1000);
        assert_eq!(config.timer.watchdog_interval_ms, 1500);
        assert_eq!(config.timer.watchdog_debounce_ms, 1200);
        assert_eq!(config.timer.heartbeat_secs, 30);
        assert_eq!(config.sync.request_timeout_secs, 10);
        assert!(config.recovery.max_credited_gap_secs.is_none());
    }

    #[test]
    fn test_first_load_writes_owner_id() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("nested").join("config.toml");

        let first = Config::load_from(path.clone()).expect("first load");
        let owner = first.sync.owner_id.clone().expect("owner generated");
        assert!(path.exists());

        let second = Config::load_from(path).expect("second load");
        assert_eq!(second.sync.owner_id.as_deref(), Some(owner.as_str()));
        assert_eq!(second.owner_id(), owner);
    }

    #[test]
    fn test_storage_overrides() {
        let mut config = Config::default();
        config.storage.state_directory = Some(PathBuf::from("/tmp/st/snap"));
        config.storage.history_file = Some(PathBuf::from("/tmp/st/log.jsonl"));

        assert_eq!(config.state_directory().unwrap(), PathBuf::from("/tmp/st/snap"));
        assert_eq!(config.history_file().unwrap(), PathBuf::from("/tmp/st/log.jsonl"));
    }
}
