use super::sensor::state_text;
use super::{Entity, EntityCommand, EntityState, Platform, Reconciled};
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::helpers::IgnoreDrop;
use crate::models::{EnergySiteContext, VehicleContext, model_from_vin};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// How an energy site sensor shapes its value
#[derive(Debug, Clone, Copy)]
pub struct EnergySensorDescription {
    pub key: &'static str,
    pub unit: Option<&'static str>,
    pub value_fn: fn(&Value) -> Value,
    /// Hold the previous reading through drops up to this size
    pub ignore_drop: Option<f64>,
}

impl EnergySensorDescription {
    const fn new(key: &'static str) -> Self {
        Self {
            key,
            unit: None,
            value_fn: identity,
            ignore_drop: None,
        }
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

fn identity(value: &Value) -> Value {
    value.clone()
}

fn or_zero(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(false) => Value::from(0),
        other => other.clone(),
    }
}

/// Wall connector state code as a name
pub fn wall_connector_state(value: &Value) -> Value {
    let name = match value.as_i64() {
        Some(0) => "booting",
        Some(1) => "charging",
        Some(2) => "not_connected",
        Some(4) => "connected",
        Some(5) => "scheduled",
        Some(6) => "negotiating",
        Some(7) => "error",
        Some(8) => "charging_finished",
        Some(9) => "waiting_car",
        Some(10) => "charging_reduced",
        _ => return Value::Null,
    };
    Value::from(name)
}

pub static ENERGY_LIVE_DESCRIPTIONS: &[EnergySensorDescription] = &[
    EnergySensorDescription::new("grid_status"),
    EnergySensorDescription::new("solar_power").unit("W"),
    EnergySensorDescription {
        ignore_drop: Some(1.0),
        ..EnergySensorDescription::new("energy_left").unit("Wh")
    },
    EnergySensorDescription::new("total_pack_energy").unit("Wh"),
    EnergySensorDescription {
        value_fn: or_zero,
        ..EnergySensorDescription::new("percentage_charged").unit("%")
    },
    EnergySensorDescription::new("battery_power").unit("W"),
    EnergySensorDescription::new("load_power").unit("W"),
    EnergySensorDescription::new("grid_power").unit("W"),
    EnergySensorDescription::new("grid_services_power").unit("W"),
    EnergySensorDescription::new("generator_power").unit("W"),
    EnergySensorDescription::new("island_status"),
];

pub static WALL_CONNECTOR_DESCRIPTIONS: &[EnergySensorDescription] = &[
    EnergySensorDescription {
        value_fn: wall_connector_state,
        ..EnergySensorDescription::new("wall_connector_state")
    },
    EnergySensorDescription::new("wall_connector_fault_state"),
    EnergySensorDescription::new("wall_connector_power").unit("W"),
];

pub static ENERGY_INFO_DESCRIPTIONS: &[EnergySensorDescription] = &[
    EnergySensorDescription::new("vpp_backup_reserve_percent").unit("%"),
    EnergySensorDescription::new("version"),
];

/// A vehicle known to the account, for naming wall connector sessions
#[derive(Debug, Clone, PartialEq)]
pub struct KnownVehicle {
    pub vin: String,
    pub name: String,
    pub model: Option<String>,
}

impl From<&VehicleContext> for KnownVehicle {
    fn from(vehicle: &VehicleContext) -> Self {
        Self {
            vin: vehicle.vin.clone(),
            name: vehicle.device.name.clone(),
            model: vehicle.device.model.clone(),
        }
    }
}

/// Where an energy sensor reads its value
#[derive(Debug, Clone)]
pub enum EnergySensorSource {
    Live(&'static EnergySensorDescription),
    WallConnector {
        din: String,
        description: &'static EnergySensorDescription,
    },
    /// Vehicle currently connected to a wall connector
    WallConnectorVehicle {
        din: String,
        vehicles: Vec<KnownVehicle>,
    },
    Info(&'static EnergySensorDescription),
    History(&'static str),
}

impl EnergySensorSource {
    fn key(&self) -> &str {
        match self {
            EnergySensorSource::Live(desc) | EnergySensorSource::Info(desc) => desc.key,
            EnergySensorSource::WallConnector { description, .. } => description.key,
            EnergySensorSource::WallConnectorVehicle { .. } => "vin",
            EnergySensorSource::History(key) => *key,
        }
    }

    fn description(&self) -> Option<&'static EnergySensorDescription> {
        match self {
            EnergySensorSource::Live(desc) | EnergySensorSource::Info(desc) => Some(*desc),
            EnergySensorSource::WallConnector { description, .. } => Some(*description),
            _ => None,
        }
    }
}

/// Sensor on an energy site or one of its wall connectors
pub struct EnergySensorEntity {
    unique_id: String,
    site: Arc<EnergySiteContext>,
    coordinator: Arc<dyn Coordinator>,
    source: EnergySensorSource,
    native_value: Value,
    available: bool,
    attributes: serde_json::Map<String, Value>,
    drop_filter: Option<IgnoreDrop>,
}

impl EnergySensorEntity {
    fn build(
        site: Arc<EnergySiteContext>,
        coordinator: Arc<dyn Coordinator>,
        unique_id: String,
        source: EnergySensorSource,
    ) -> Self {
        let drop_filter = source
            .description()
            .and_then(|d| d.ignore_drop)
            .map(IgnoreDrop::new);
        let mut entity = Self {
            unique_id,
            site,
            coordinator,
            source,
            native_value: Value::Null,
            available: false,
            attributes: serde_json::Map::new(),
            drop_filter,
        };
        entity.read();
        entity
    }

    pub fn live(site: Arc<EnergySiteContext>, description: &'static EnergySensorDescription) -> Self {
        let coordinator: Arc<dyn Coordinator> = site.live_coordinator.clone();
        let unique_id = format!("{}-{}", site.id, description.key);
        Self::build(site, coordinator, unique_id, EnergySensorSource::Live(description))
    }

    pub fn wall_connector(
        site: Arc<EnergySiteContext>,
        din: &str,
        description: &'static EnergySensorDescription,
    ) -> Self {
        let coordinator: Arc<dyn Coordinator> = site.live_coordinator.clone();
        let unique_id = format!("{}-{}-{}", site.id, din, description.key);
        let source = EnergySensorSource::WallConnector {
            din: din.to_string(),
            description,
        };
        Self::build(site, coordinator, unique_id, source)
    }

    pub fn wall_connector_vehicle(
        site: Arc<EnergySiteContext>,
        din: &str,
        vehicles: Vec<KnownVehicle>,
    ) -> Self {
        let coordinator: Arc<dyn Coordinator> = site.live_coordinator.clone();
        let unique_id = format!("{}-{}-vin", site.id, din);
        let source = EnergySensorSource::WallConnectorVehicle {
            din: din.to_string(),
            vehicles,
        };
        Self::build(site, coordinator, unique_id, source)
    }

    pub fn info(site: Arc<EnergySiteContext>, description: &'static EnergySensorDescription) -> Self {
        let coordinator: Arc<dyn Coordinator> = site.info_coordinator.clone();
        let unique_id = format!("{}-{}", site.id, description.key);
        Self::build(site, coordinator, unique_id, EnergySensorSource::Info(description))
    }

    /// `None` when the site has no history coordinator
    pub fn history(site: Arc<EnergySiteContext>, key: &'static str) -> Option<Self> {
        let coordinator: Arc<dyn Coordinator> = site.history_coordinator.clone()?;
        let unique_id = format!("{}-{}", site.id, key);
        Some(Self::build(site, coordinator, unique_id, EnergySensorSource::History(key)))
    }

    pub fn source(&self) -> &EnergySensorSource {
        &self.source
    }

    pub fn site_id(&self) -> u64 {
        self.site.id
    }

    pub fn native_value(&self) -> &Value {
        &self.native_value
    }

    fn wall_connector_record(&self, din: &str) -> Option<Value> {
        self.coordinator
            .core()
            .get("wall_connectors")
            .and_then(|wcs| wcs.get(din).cloned())
    }

    fn read(&mut self) {
        let core = self.coordinator.core();
        match &self.source {
            EnergySensorSource::Live(desc) | EnergySensorSource::Info(desc) => {
                let desc: &'static EnergySensorDescription = *desc;
                let value = core.get(desc.key);
                self.apply(value, desc);
            }
            EnergySensorSource::WallConnector { din, description } => {
                let description = *description;
                // Connector records missing this field keep the last value
                let Some(record) = self.wall_connector_record(din) else {
                    return;
                };
                let Some(value) = record.get(description.key).cloned() else {
                    return;
                };
                self.apply(Some(value), description);
            }
            EnergySensorSource::WallConnectorVehicle { din, vehicles } => {
                let Some(record) = self.wall_connector_record(din) else {
                    return;
                };
                let Some(value) = record.get("vin") else {
                    return;
                };
                self.available = true;
                self.attributes.clear();
                let Some(vin) = value.as_str() else {
                    self.native_value = Value::from("None");
                    return;
                };
                match vehicles.iter().find(|v| v.vin == vin) {
                    Some(vehicle) => {
                        self.native_value = Value::from(vehicle.name.clone());
                        self.attributes.insert("vin".to_string(), Value::from(vin));
                        self.attributes
                            .insert("model".to_string(), Value::from(vehicle.model.clone()));
                    }
                    None => {
                        self.native_value = Value::from(vin);
                        self.attributes.insert("vin".to_string(), Value::from(vin));
                        self.attributes
                            .insert("model".to_string(), Value::from(model_from_vin(vin)));
                    }
                }
            }
            EnergySensorSource::History(key) => {
                self.available = true;
                self.native_value = core.get(key).unwrap_or_else(|| Value::from(0));
            }
        }
    }

    fn apply(&mut self, value: Option<Value>, description: &EnergySensorDescription) {
        match value {
            None | Some(Value::Null) => {
                self.available = false;
                self.native_value = (description.value_fn)(&Value::Null);
            }
            Some(value) => {
                self.available = true;
                let shaped = (description.value_fn)(&value);
                self.native_value = match self.drop_filter.as_mut() {
                    Some(filter) => filter.filter(shaped),
                    None => shaped,
                };
            }
        }
        if let Some(unit) = description.unit {
            self.attributes
                .insert("unit_of_measurement".to_string(), Value::from(unit));
        }
    }
}

#[async_trait]
impl Entity for EnergySensorEntity {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn platform(&self) -> Platform {
        Platform::Sensor
    }

    fn state(&self) -> EntityState {
        EntityState {
            state: state_text(&self.native_value),
            available: self.available && self.coordinator.core().last_update_success(),
            attributes: self.attributes.clone(),
        }
    }

    fn write_state(&self) -> bool {
        self.coordinator
            .core()
            .hub()
            .publish_state(&self.unique_id, self.state())
    }

    fn coordinator_updates(&self) -> watch::Receiver<u64> {
        self.coordinator.core().subscribe()
    }

    fn handle_coordinator_update(&mut self) -> Reconciled {
        let before = self.state();
        self.read();
        let reconciled = if self.state() == before {
            Reconciled::Unchanged
        } else {
            Reconciled::Overwritten
        };
        self.write_state();
        reconciled
    }

    async fn apply_command(&mut self, command: EntityCommand) -> Result<()> {
        Err(command.unsupported())
    }
}

impl std::fmt::Debug for EnergySensorEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergySensorEntity")
            .field("unique_id", &self.unique_id)
            .field("key", &self.source.key())
            .field("native_value", &self.native_value)
            .finish()
    }
}
