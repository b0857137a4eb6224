use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::{EntityCommand, EntityState, Platform};
use crate::api::VehicleCommand;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde_json::Value;

const VEHICLE_TIMESTAMP: &str = "vehicle_state_timestamp";
const CHARGE_TIMESTAMP: &str = "charge_state_timestamp";
const CABLE_ENGAGED: &str = "Engaged";
const PIN_FORMAT: &str = r"^\d\d\d\d$";

pub type DoorLockEntity = VehicleEntity<DoorLock>;
pub type CableLockEntity = VehicleEntity<CableLock>;
pub type SpeedLimitLockEntity = VehicleEntity<SpeedLimitLock>;

fn lock_state(locked: Option<bool>) -> EntityState {
    let state = locked.map(|l| if l { "locked" } else { "unlocked" }.to_string());
    EntityState::new(state)
}

/// Streamed booleans arrive as JSON bools or the strings "true"/"false"
fn stream_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

/// Door locks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoorLock {
    locked: Option<bool>,
}

impl DoorLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> Option<bool> {
        self.locked
    }
}

#[async_trait]
impl VehicleEntityKind for DoorLock {
    fn platform(&self) -> Platform {
        Platform::Lock
    }

    fn key(&self) -> &str {
        "vehicle_state_locked"
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        Some(VEHICLE_TIMESTAMP)
    }

    fn streaming_key(&self) -> Option<&'static str> {
        Some("Locked")
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        self.locked = base.value().as_ref().and_then(Value::as_bool);
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.locked = Some(stream_bool(value));
    }

    async fn apply_command(&mut self, base: &VehicleEntityBase, command: EntityCommand) -> Result<()> {
        match command {
            EntityCommand::Lock { .. } => {
                base.send(VehicleCommand::DoorLock).await?;
                self.locked = Some(true);
                Ok(())
            }
            EntityCommand::Unlock { .. } => {
                base.send(VehicleCommand::DoorUnlock).await?;
                self.locked = Some(false);
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }

    fn value(&self) -> EntityState {
        lock_state(self.locked)
    }
}

/// Charge cable latch; only unlocking is possible
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CableLock {
    locked: Option<bool>,
}

impl CableLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> Option<bool> {
        self.locked
    }
}

#[async_trait]
impl VehicleEntityKind for CableLock {
    fn platform(&self) -> Platform {
        Platform::Lock
    }

    fn key(&self) -> &str {
        "charge_state_charge_port_latch"
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        Some(CHARGE_TIMESTAMP)
    }

    fn streaming_key(&self) -> Option<&'static str> {
        Some("ChargePortLatch")
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        self.locked = base
            .value()
            .map(|v| v.as_str() == Some(CABLE_ENGAGED));
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.locked = Some(value.as_str() == Some(CABLE_ENGAGED));
    }

    async fn apply_command(&mut self, base: &VehicleEntityBase, command: EntityCommand) -> Result<()> {
        match command {
            EntityCommand::Lock { .. } => Err(BridgeError::validation("code", "Insert cable to lock")),
            EntityCommand::Unlock { .. } => {
                base.send(VehicleCommand::ChargePortDoorOpen).await?;
                self.locked = Some(false);
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }

    fn value(&self) -> EntityState {
        lock_state(self.locked)
    }
}

/// Matches [`PIN_FORMAT`]
fn valid_pin(code: &str) -> bool {
    code.len() == 4 && code.chars().all(|c| c.is_ascii_digit())
}

/// The PIN to send, `None` when no code was given
fn checked_pin(code: Option<String>) -> Result<Option<String>> {
    match code.filter(|c| !c.is_empty()) {
        Some(pin) if !valid_pin(&pin) => Err(BridgeError::validation("code", "Speed limit PIN must be four digits")),
        other => Ok(other),
    }
}

/// Speed limit mode, guarded by a four digit PIN
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedLimitLock {
    locked: Option<bool>,
}

impl SpeedLimitLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> Option<bool> {
        self.locked
    }
}

#[async_trait]
impl VehicleEntityKind for SpeedLimitLock {
    fn platform(&self) -> Platform {
        Platform::Lock
    }

    fn key(&self) -> &str {
        "vehicle_state_speed_limit_mode_active"
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        Some(VEHICLE_TIMESTAMP)
    }

    fn streaming_key(&self) -> Option<&'static str> {
        Some("SpeedLimitMode")
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        self.locked = base.value().as_ref().and_then(Value::as_bool);
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.locked = Some(stream_bool(value));
    }

    /// Without a code the call does nothing
    async fn apply_command(&mut self, base: &VehicleEntityBase, command: EntityCommand) -> Result<()> {
        match command {
            EntityCommand::Lock { code } => {
                if let Some(pin) = checked_pin(code)? {
                    base.send(VehicleCommand::SpeedLimitActivate { pin }).await?;
                    self.locked = Some(true);
                }
                Ok(())
            }
            EntityCommand::Unlock { code } => {
                if let Some(pin) = checked_pin(code)? {
                    base.send(VehicleCommand::SpeedLimitDeactivate { pin }).await?;
                    self.locked = Some(false);
                }
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }

    fn value(&self) -> EntityState {
        lock_state(self.locked).with_attribute("code_format", PIN_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_bool() {
        assert!(stream_bool(&json!("true")));
        assert!(stream_bool(&json!(true)));
        assert!(!stream_bool(&json!("false")));
        assert!(!stream_bool(&json!(1)));
    }

    #[test]
    fn test_cable_stream_value() {
        let mut cable = CableLock::new();
        cable.read_from_stream(&json!("Engaged"));
        assert_eq!(cable.is_locked(), Some(true));
        cable.read_from_stream(&json!("Disengaged"));
        assert_eq!(cable.value().state.as_deref(), Some("unlocked"));
    }

    #[test]
    fn test_pin_validation() {
        assert!(valid_pin("0042"));
        assert!(!valid_pin("12"));
        assert!(!valid_pin("12345"));
        assert!(!valid_pin("abcd"));
        assert!(!valid_pin("١٢٣٤"));
        assert_eq!(checked_pin(None).unwrap(), None);
        assert_eq!(checked_pin(Some(String::new())).unwrap(), None);
        assert!(checked_pin(Some("12a4".to_string())).is_err());
    }

    #[test]
    fn test_speed_limit_code_format() {
        let state = SpeedLimitLock::new().value();
        assert_eq!(state.state, None);
        assert_eq!(state.attribute("code_format"), Some(&json!(r"^\d\d\d\d$")));
    }
}
