use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/teslemetry_bridge.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            vehicle_interval_secs: 30,
            vehicle_wait_secs: 15 * 60,
            energy_live_interval_secs: 30,
            energy_info_interval_secs: 30,
            energy_history_interval_secs: 30,
            failure_threshold: 2,
        }
    }
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            sleep_after_minutes: 15,
            reset_after_minutes: 20,
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_step_secs: 5,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gap_ms: 60_000,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            state_file: "/data/teslemetry_state.json".to_string(),
        }
    }
}
