//! Configuration management for the Teslemetry bridge
//!
//! This module handles loading, validation, and management of the bridge
//! configuration from YAML files. Every section has defaults so a partial
//! file (or no file at all) yields a working setup.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Coordinator polling intervals
    pub polling: PollingConfig,

    /// Sleep window for vehicles that cannot fall asleep while polled
    pub sleep: SleepConfig,

    /// Wake-up retry behaviour before vehicle commands
    pub wake: WakeConfig,

    /// Push stream handling
    pub streaming: StreamingConfig,

    /// Entity state persistence for restore-on-restart
    pub persistence: PersistenceConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level override
    pub console_level: Option<String>,

    /// Optional file-specific level override
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Coordinator polling intervals, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Normal vehicle data interval
    pub vehicle_interval_secs: u64,

    /// Extended interval used to let a pre-2021 vehicle fall asleep
    pub vehicle_wait_secs: u64,

    /// Energy site live status interval
    pub energy_live_interval_secs: u64,

    /// Energy site info interval
    pub energy_info_interval_secs: u64,

    /// Energy site history interval
    pub energy_history_interval_secs: u64,

    /// Consecutive transient failures tolerated before a refresh fails
    pub failure_threshold: u32,
}

/// Sleep window for vehicles that need the poller to back off
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Inactivity after which polling backs off
    pub sleep_after_minutes: i64,

    /// Inactivity after which the vehicle is assumed awake for its own reason
    pub reset_after_minutes: i64,
}

/// Wake-up retry behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Attempts before giving up
    pub max_attempts: u32,

    /// Linear back-off step between attempts, in seconds
    pub backoff_step_secs: u64,
}

/// Push stream handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Whether stream listeners are attached at setup
    pub enabled: bool,

    /// How much newer (ms) a polled value must be to override a streamed one
    pub gap_ms: i64,
}

/// Entity state persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Whether last states are written to disk
    pub enabled: bool,

    /// JSON file holding the last published entity states
    pub state_file: String,
}

impl PollingConfig {
    pub fn vehicle_interval(&self) -> Duration {
        Duration::from_secs(self.vehicle_interval_secs)
    }

    pub fn vehicle_wait(&self) -> Duration {
        Duration::from_secs(self.vehicle_wait_secs)
    }

    pub fn energy_live_interval(&self) -> Duration {
        Duration::from_secs(self.energy_live_interval_secs)
    }

    pub fn energy_info_interval(&self) -> Duration {
        Duration::from_secs(self.energy_info_interval_secs)
    }

    pub fn energy_history_interval(&self) -> Duration {
        Duration::from_secs(self.energy_history_interval_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "teslemetry_bridge.yaml",
            "/data/teslemetry_bridge.yaml",
            "/etc/teslemetry-bridge/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                let config = Self::from_file(path)?;
                config.validate()?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("polling.vehicle_interval_secs", self.polling.vehicle_interval_secs),
            ("polling.vehicle_wait_secs", self.polling.vehicle_wait_secs),
            (
                "polling.energy_live_interval_secs",
                self.polling.energy_live_interval_secs,
            ),
            (
                "polling.energy_info_interval_secs",
                self.polling.energy_info_interval_secs,
            ),
            (
                "polling.energy_history_interval_secs",
                self.polling.energy_history_interval_secs,
            ),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(BridgeError::validation(field, "Must be greater than 0"));
            }
        }

        if self.sleep.sleep_after_minutes <= 0 {
            return Err(BridgeError::validation(
                "sleep.sleep_after_minutes",
                "Must be positive",
            ));
        }

        if self.sleep.reset_after_minutes <= self.sleep.sleep_after_minutes {
            return Err(BridgeError::validation(
                "sleep.reset_after_minutes",
                "Must be greater than sleep_after_minutes",
            ));
        }

        if self.wake.max_attempts == 0 {
            return Err(BridgeError::validation(
                "wake.max_attempts",
                "Must be at least 1",
            ));
        }

        if self.streaming.gap_ms < 0 {
            return Err(BridgeError::validation(
                "streaming.gap_ms",
                "Must not be negative",
            ));
        }

        if self.persistence.enabled && self.persistence.state_file.trim().is_empty() {
            return Err(BridgeError::validation(
                "persistence.state_file",
                "Path cannot be empty when persistence is enabled",
            ));
        }

        Ok(())
    }
}
