//! Entities exposed to the host platform
//!
//! Every entity reads its value from a coordinator snapshot and, for vehicle
//! entities with a streaming key, from push stream fields. Vehicle entities
//! share [`VehicleEntityBase`] for scope checks, wake-up, command result
//! handling and the polling/streaming arbitration; the per-kind behaviour
//! lives behind [`VehicleEntityKind`]. Energy site controls do the same with
//! [`EnergyEntityBase`] and [`EnergyEntityKind`].

use crate::error::{BridgeError, Result};
use crate::stream::StreamMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;

mod base;
mod binary_sensor;
mod climate;
mod cover;
mod device_tracker;
mod energy;
mod lock;
mod number;
mod select;
mod sensor;
mod site;
mod switch;
mod update;

pub use base::{EntityOptions, VehicleEntity, VehicleEntityBase, VehicleEntityKind};
pub use binary_sensor::{
    ENERGY_BINARY_SENSORS, EnergyBinarySensor, EnergyBinarySensorDescription,
    EnergyBinarySensorEntity, VEHICLE_BINARY_SENSORS, VehicleBinarySensor,
    VehicleBinarySensorDescription, VehicleBinarySensorEntity,
};
pub use climate::{
    CabinOverheatProtection, CabinOverheatProtectionEntity, Climate, ClimateEntity, FAN_MODES,
    PRESET_MODES,
};
pub use cover::{CoverEntity, CoverKind, VehicleCover};
pub use device_tracker::{DeviceTrackerEntity, LOCATIONS, LocationDescription, VehicleLocation};
pub use energy::{
    ENERGY_INFO_DESCRIPTIONS, ENERGY_LIVE_DESCRIPTIONS, EnergySensorDescription,
    EnergySensorEntity, EnergySensorSource, KnownVehicle, WALL_CONNECTOR_DESCRIPTIONS,
    wall_connector_state,
};
pub use lock::{CableLock, CableLockEntity, DoorLock, DoorLockEntity, SpeedLimitLock, SpeedLimitLockEntity};
pub use number::{
    ENERGY_NUMBERS, EnergyNumber, EnergyNumberDescription, EnergyNumberEntity, VEHICLE_NUMBERS,
    VehicleNumber, VehicleNumberDescription, VehicleNumberEntity,
};
pub use select::{
    EXPORT_RULE_SELECT, EnergySelect, EnergySelectDescription, EnergySelectEntity, HEATER_OPTIONS,
    OPERATION_MODE_SELECT, SEAT_HEATERS, SeatHeaterDescription, SeatHeaterEntity, SeatHeaterSelect,
};
pub use sensor::{
    VEHICLE_SENSORS, VEHICLE_STATE_SENSOR, VehicleSensor, VehicleSensorDescription,
    VehicleSensorEntity, charge_state,
};
pub use site::{EnergyEntity, EnergyEntityBase, EnergyEntityKind, SiteSource};
pub use switch::{
    CHARGE_FROM_GRID_SWITCH, EnergySwitch, EnergySwitchDescription, EnergySwitchEntity,
    STORM_MODE_SWITCH, VEHICLE_SWITCHES, VehicleSwitch, VehicleSwitchDescription,
    VehicleSwitchEntity,
};
pub use update::{SoftwareUpdate, UpdateEntity, installed_version};

/// Entity state as written to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub state: Option<String>,
    pub available: bool,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    pub fn new(state: Option<String>) -> Self {
        Self {
            state,
            available: true,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Host platform an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(rename = "binary_sensor")]
    BinarySensor,
    Climate,
    Cover,
    #[serde(rename = "device_tracker")]
    DeviceTracker,
    Lock,
    Number,
    Select,
    Sensor,
    Switch,
    Update,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Climate => "climate",
            Platform::Cover => "cover",
            Platform::DeviceTracker => "device_tracker",
            Platform::Lock => "lock",
            Platform::Number => "number",
            Platform::Select => "select",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
            Platform::Update => "update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Off,
    HeatCool,
    Cool,
    FanOnly,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::Cool => "cool",
            HvacMode::FanOnly => "fan_only",
        }
    }
}

impl FromStr for HvacMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(HvacMode::Off),
            "heat_cool" => Ok(HvacMode::HeatCool),
            "cool" => Ok(HvacMode::Cool),
            "fan_only" => Ok(HvacMode::FanOnly),
            other => Err(BridgeError::validation(
                "hvac_mode".to_string(),
                format!("Unknown HVAC mode {}", other),
            )),
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service calls an entity can receive
#[derive(Debug, Clone, PartialEq)]
pub enum EntityCommand {
    TurnOn,
    TurnOff,
    SetTemperature {
        temperature: Option<f64>,
        hvac_mode: Option<HvacMode>,
    },
    SetHvacMode(HvacMode),
    SetPresetMode(String),
    SetFanMode(String),
    Lock { code: Option<String> },
    Unlock { code: Option<String> },
    Install,
    OpenCover,
    CloseCover,
    StopCover,
    SelectOption(String),
    SetValue(f64),
}

impl EntityCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EntityCommand::TurnOn => "turn_on",
            EntityCommand::TurnOff => "turn_off",
            EntityCommand::SetTemperature { .. } => "set_temperature",
            EntityCommand::SetHvacMode(_) => "set_hvac_mode",
            EntityCommand::SetPresetMode(_) => "set_preset_mode",
            EntityCommand::SetFanMode(_) => "set_fan_mode",
            EntityCommand::Lock { .. } => "lock",
            EntityCommand::Unlock { .. } => "unlock",
            EntityCommand::Install => "install",
            EntityCommand::OpenCover => "open_cover",
            EntityCommand::CloseCover => "close_cover",
            EntityCommand::StopCover => "stop_cover",
            EntityCommand::SelectOption(_) => "select_option",
            EntityCommand::SetValue(_) => "set_value",
        }
    }

    /// Error for a command the entity does not implement
    pub fn unsupported(&self) -> BridgeError {
        BridgeError::validation("command".to_string(), format!("{} is not supported", self.name()))
    }
}

/// Source of the last applied value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    None,
    Polling,
    Streaming,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::None => "none",
            UpdateType::Polling => "polling",
            UpdateType::Streaming => "streaming",
        }
    }
}

/// Result of offering a coordinator update to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// A newer streamed value was kept
    Skipped,
    /// The polled value matched what the entity already showed
    Unchanged,
    /// The polled value replaced the entity's value
    Overwritten,
}

#[async_trait]
pub trait Entity: Send + Sync {
    fn unique_id(&self) -> &str;

    fn platform(&self) -> Platform;

    fn vin(&self) -> Option<&str> {
        None
    }

    fn streaming_key(&self) -> Option<&str> {
        None
    }

    fn state(&self) -> EntityState;

    /// Write the current state to the host
    fn write_state(&self) -> bool;

    /// Receiver for the coordinator this entity follows
    fn coordinator_updates(&self) -> watch::Receiver<u64>;

    fn handle_coordinator_update(&mut self) -> Reconciled;

    /// Apply a stream message; false when it does not concern this entity
    fn handle_stream_update(&mut self, _message: &StreamMessage) -> bool {
        false
    }

    /// Seed values from the state saved before a restart
    fn restore(&mut self, _saved: &EntityState) {}

    async fn apply_command(&mut self, command: EntityCommand) -> Result<()>;
}

/// Read a JSON number or numeric string
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JSON number for an optional float
pub(crate) fn number_or_null(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map_or(Value::Null, Value::Number)
}
