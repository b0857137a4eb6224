use crate::config::SleepConfig;
use crate::helpers::is_truthy;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Signals that keep a vehicle from being left to sleep
///
/// Any one of them counts; they are not ranked against each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleActivity {
    pub charging: bool,
    pub user_present: bool,
    pub sentry_mode: bool,
}

impl VehicleActivity {
    /// Read activity from an unflattened vehicle data response
    pub fn from_vehicle_data(data: &Value) -> Self {
        let charge_state = data.get("charge_state");
        let vehicle_state = data.get("vehicle_state");
        Self {
            charging: charge_state
                .and_then(|c| c.get("charging_state"))
                .and_then(Value::as_str)
                == Some("Charging"),
            user_present: is_truthy(vehicle_state.and_then(|v| v.get("is_user_present"))),
            sentry_mode: is_truthy(vehicle_state.and_then(|v| v.get("sentry_mode"))),
        }
    }

    pub fn is_active(&self) -> bool {
        self.charging || self.user_present || self.sentry_mode
    }
}

/// Poll cadence chosen after a successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Normal,
    /// Stop polling long enough for the vehicle to fall asleep
    Extended,
}

/// Inactivity tracking for vehicles that cannot sleep while polled
#[derive(Debug, Clone)]
pub struct SleepPolicy {
    sleep_after: Duration,
    reset_after: Duration,
    last_active: DateTime<Utc>,
}

impl SleepPolicy {
    pub fn new(sleep_after: Duration, reset_after: Duration, now: DateTime<Utc>) -> Self {
        Self {
            sleep_after,
            reset_after,
            last_active: now,
        }
    }

    pub fn from_config(config: &SleepConfig, now: DateTime<Utc>) -> Self {
        Self::new(
            Duration::minutes(config.sleep_after_minutes),
            Duration::minutes(config.reset_after_minutes),
            now,
        )
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Record one observation and pick the next cadence
    ///
    /// Inactive for longer than `reset_after` means the vehicle woke up on
    /// its own, which starts a new active period.
    pub fn observe(&mut self, active: bool, now: DateTime<Utc>) -> Cadence {
        if active {
            self.last_active = now;
            return Cadence::Normal;
        }
        let elapsed = now - self.last_active;
        if elapsed > self.reset_after {
            self.last_active = now;
            Cadence::Normal
        } else if elapsed > self.sleep_after {
            Cadence::Extended
        } else {
            Cadence::Normal
        }
    }
}
