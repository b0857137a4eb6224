//! Entity construction and update plumbing
//!
//! [`build_entities`] creates every entity for a loaded [`BridgeData`];
//! [`EntityRegistry`] owns them, routes coordinator notifications and stream
//! messages to them and dispatches host service calls.

use crate::api::Scope;
use crate::config::Config;
use crate::coordinator::{Coordinator, ENERGY_HISTORY_FIELDS};
use crate::entity::{
    CHARGE_FROM_GRID_SWITCH, CabinOverheatProtection, CableLock, Climate, CoverKind, DoorLock,
    ENERGY_BINARY_SENSORS, ENERGY_INFO_DESCRIPTIONS, ENERGY_LIVE_DESCRIPTIONS, ENERGY_NUMBERS,
    EXPORT_RULE_SELECT, EnergyBinarySensor, EnergyEntity, EnergyNumber, EnergySelect,
    EnergySensorEntity, EnergySwitch, Entity, EntityCommand, EntityOptions, EntityState,
    KnownVehicle, LOCATIONS, OPERATION_MODE_SELECT, SEAT_HEATERS, STORM_MODE_SWITCH, SeatHeaterSelect,
    SiteSource, SoftwareUpdate, SpeedLimitLock, VEHICLE_BINARY_SENSORS, VEHICLE_NUMBERS,
    VEHICLE_SENSORS, VEHICLE_STATE_SENSOR, VEHICLE_SWITCHES, VehicleBinarySensor, VehicleCover,
    VehicleEntity, VehicleEntityKind, VehicleLocation, VehicleNumber, VehicleSensor,
    VehicleSwitch, WALL_CONNECTOR_DESCRIPTIONS,
};
use crate::error::{BridgeError, Result};
use crate::helpers::is_truthy;
use crate::logging::{StructuredLogger, get_logger};
use crate::models::BridgeData;
use crate::persistence::StateStore;
use crate::stream::StreamMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;

pub type SharedEntity = Arc<Mutex<Box<dyn Entity>>>;

/// Create every entity for the account
///
/// Entities that only the stream feeds are created when streaming is on and
/// the vehicle supports it. Energy site controls are created only for the
/// hardware the site reports.
pub fn build_entities(data: &BridgeData, config: &Config) -> Vec<Box<dyn Entity>> {
    let mut entities: Vec<Box<dyn Entity>> = Vec::new();
    let options = EntityOptions::from_config(config, data.has_scope(Scope::VehicleCmds));
    let options_for = |scopes: &[Scope]| {
        EntityOptions::from_config(config, scopes.iter().any(|s| data.has_scope(*s)))
    };

    for vehicle in &data.vehicles {
        let streamed = config.streaming.enabled && !vehicle.api.pre2021();

        entities.push(Box::new(VehicleEntity::new(
            vehicle.clone(),
            Climate::new(),
            options.clone(),
        )));
        entities.push(Box::new(VehicleEntity::new(
            vehicle.clone(),
            CabinOverheatProtection::new(),
            options.clone(),
        )));
        entities.push(Box::new(VehicleEntity::new(
            vehicle.clone(),
            DoorLock::new(),
            options.clone(),
        )));
        entities.push(Box::new(VehicleEntity::new(
            vehicle.clone(),
            CableLock::new(),
            options.clone(),
        )));
        entities.push(Box::new(VehicleEntity::new(
            vehicle.clone(),
            SpeedLimitLock::new(),
            options.clone(),
        )));
        entities.push(Box::new(VehicleEntity::new(
            vehicle.clone(),
            SoftwareUpdate::new(),
            options.clone(),
        )));
        entities.push(Box::new(VehicleEntity::new(
            vehicle.clone(),
            VehicleSensor::new(&VEHICLE_STATE_SENSOR),
            options.clone(),
        )));
        for description in VEHICLE_SENSORS.iter().filter(|d| d.polled || streamed) {
            entities.push(Box::new(VehicleEntity::new(
                vehicle.clone(),
                VehicleSensor::new(description),
                options.clone(),
            )));
        }
        for description in VEHICLE_BINARY_SENSORS.iter().filter(|d| d.polled || streamed) {
            entities.push(Box::new(VehicleEntity::new(
                vehicle.clone(),
                VehicleBinarySensor::new(description),
                options.clone(),
            )));
        }
        for description in VEHICLE_SWITCHES {
            entities.push(Box::new(VehicleEntity::new(
                vehicle.clone(),
                VehicleSwitch::new(description),
                options_for(description.scopes),
            )));
        }

        let sunroof = is_truthy(
            vehicle
                .coordinator
                .core()
                .get("vehicle_config_sun_roof_installed")
                .as_ref(),
        );
        for kind in CoverKind::ALL {
            if kind == CoverKind::Sunroof && !sunroof {
                continue;
            }
            let cover = VehicleCover::new(kind);
            let options = options_for(cover.required_scopes());
            entities.push(Box::new(VehicleEntity::new(vehicle.clone(), cover, options)));
        }

        for description in SEAT_HEATERS {
            entities.push(Box::new(VehicleEntity::new(
                vehicle.clone(),
                SeatHeaterSelect::new(description),
                options.clone(),
            )));
        }
        for description in VEHICLE_NUMBERS {
            entities.push(Box::new(VehicleEntity::new(
                vehicle.clone(),
                VehicleNumber::new(description),
                options_for(description.scopes),
            )));
        }
        for description in LOCATIONS
            .iter()
            .filter(|d| d.polling_prefix.is_some() || streamed)
        {
            entities.push(Box::new(VehicleEntity::new(
                vehicle.clone(),
                VehicleLocation::new(description),
                options.clone(),
            )));
        }
    }

    let known: Vec<KnownVehicle> = data
        .vehicles
        .iter()
        .map(|v| KnownVehicle::from(v.as_ref()))
        .collect();
    let energy_scoped = data.has_scope(Scope::EnergyCmds);

    for site in &data.energysites {
        let live = site.live_coordinator.core();
        for description in ENERGY_LIVE_DESCRIPTIONS {
            if live.contains(description.key) {
                entities.push(Box::new(EnergySensorEntity::live(site.clone(), description)));
            }
        }

        if let Some(serde_json::Value::Object(connectors)) = live.get("wall_connectors") {
            for din in connectors.keys() {
                for description in WALL_CONNECTOR_DESCRIPTIONS {
                    entities.push(Box::new(EnergySensorEntity::wall_connector(
                        site.clone(),
                        din,
                        description,
                    )));
                }
                entities.push(Box::new(EnergySensorEntity::wall_connector_vehicle(
                    site.clone(),
                    din,
                    known.clone(),
                )));
            }
        }

        let info = site.info_coordinator.core();
        for description in ENERGY_INFO_DESCRIPTIONS {
            if info.contains(description.key) {
                entities.push(Box::new(EnergySensorEntity::info(site.clone(), description)));
            }
        }

        for key in ENERGY_HISTORY_FIELDS {
            if let Some(entity) = EnergySensorEntity::history(site.clone(), key) {
                entities.push(Box::new(entity));
            }
        }

        for description in ENERGY_BINARY_SENSORS {
            let reported = match description.source {
                SiteSource::Live => live.contains(description.key),
                SiteSource::Info => info.contains(description.key),
            };
            if reported {
                entities.push(Box::new(EnergyEntity::new(
                    site.clone(),
                    EnergyBinarySensor::new(description),
                    energy_scoped,
                )));
            }
        }

        let has = |key: &str| is_truthy(info.get(key).as_ref());
        let battery = has("components_battery");
        let solar = has("components_solar");
        if has("components_storm_mode_capable") {
            entities.push(Box::new(EnergyEntity::new(
                site.clone(),
                EnergySwitch::new(&STORM_MODE_SWITCH),
                energy_scoped,
            )));
        }
        if battery && solar {
            entities.push(Box::new(EnergyEntity::new(
                site.clone(),
                EnergySwitch::new(&CHARGE_FROM_GRID_SWITCH),
                energy_scoped,
            )));
            entities.push(Box::new(EnergyEntity::new(
                site.clone(),
                EnergySelect::new(&EXPORT_RULE_SELECT),
                energy_scoped,
            )));
        }
        if battery {
            entities.push(Box::new(EnergyEntity::new(
                site.clone(),
                EnergySelect::new(&OPERATION_MODE_SELECT),
                energy_scoped,
            )));
        }
        for description in ENERGY_NUMBERS {
            if has(description.requires) {
                entities.push(Box::new(EnergyEntity::new(
                    site.clone(),
                    EnergyNumber::new(description),
                    energy_scoped,
                )));
            }
        }
    }

    entities
}

/// Owns all entities and their update tasks
pub struct EntityRegistry {
    entities: HashMap<String, SharedEntity>,
    order: Vec<String>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    logger: StructuredLogger,
}

impl EntityRegistry {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            entities: HashMap::new(),
            order: Vec::new(),
            tasks: Vec::new(),
            shutdown,
            logger: get_logger("platform"),
        }
    }

    /// Register an entity; unique ids must not repeat
    pub fn add(&mut self, entity: Box<dyn Entity>) -> Result<()> {
        let unique_id = entity.unique_id().to_string();
        if self.entities.contains_key(&unique_id) {
            return Err(BridgeError::validation(
                "unique_id".to_string(),
                format!("Duplicate entity {}", unique_id),
            ));
        }
        self.order.push(unique_id.clone());
        self.entities.insert(unique_id, Arc::new(Mutex::new(entity)));
        Ok(())
    }

    pub fn extend(&mut self, entities: Vec<Box<dyn Entity>>) -> Result<()> {
        for entity in entities {
            self.add(entity)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Unique ids in registration order
    pub fn unique_ids(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, unique_id: &str) -> Option<SharedEntity> {
        self.entities.get(unique_id).cloned()
    }

    pub async fn state(&self, unique_id: &str) -> Option<EntityState> {
        let entity = self.get(unique_id)?;
        let guard = entity.lock().await;
        Some(guard.state())
    }

    /// Seed entities from saved states; returns how many were restored
    pub async fn restore(&self, store: &StateStore) -> usize {
        let mut restored = 0;
        for unique_id in &self.order {
            let (Some(entity), Some(saved)) = (self.entities.get(unique_id), store.get(unique_id))
            else {
                continue;
            };
            entity.lock().await.restore(saved);
            restored += 1;
        }
        restored
    }

    /// Publish every entity's current state
    pub async fn write_all(&self) {
        for unique_id in &self.order {
            if let Some(entity) = self.entities.get(unique_id) {
                entity.lock().await.write_state();
            }
        }
    }

    /// Dispatch a host service call to one entity
    pub async fn command(&self, unique_id: &str, command: EntityCommand) -> Result<()> {
        let entity = self.get(unique_id).ok_or_else(|| {
            BridgeError::validation("entity_id".to_string(), format!("Unknown entity {}", unique_id))
        })?;
        let name = command.name();
        let mut guard = entity.lock().await;
        let result = guard.apply_command(command).await;
        if let Err(e) = &result {
            self.logger
                .warn(&format!("{} on {} failed: {}", name, unique_id, e));
        }
        result
    }

    /// Spawn one update task per entity
    ///
    /// Each task follows its coordinator's change notifications and, when the
    /// entity has a streaming key and `streaming` is on, its vehicle's stream.
    pub async fn start(&mut self, data: &BridgeData, streaming: bool) {
        for unique_id in &self.order {
            let Some(entity) = self.entities.get(unique_id).cloned() else {
                continue;
            };
            let (updates, stream) = {
                let guard = entity.lock().await;
                let stream = match (guard.vin(), guard.streaming_key()) {
                    (Some(vin), Some(_)) if streaming => data
                        .vehicle(vin)
                        .filter(|v| v.stream.server().is_some())
                        .map(|v| v.stream.subscribe()),
                    _ => None,
                };
                (guard.coordinator_updates(), stream)
            };
            let shutdown = self.shutdown.subscribe();
            self.tasks
                .push(tokio::spawn(entity_loop(entity, updates, stream, shutdown)));
        }
        self.logger
            .info(&format!("Started {} entity update tasks", self.tasks.len()));
    }

    /// Stop all update tasks and wait for them
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn next_message(
    stream: &mut Option<broadcast::Receiver<StreamMessage>>,
) -> std::result::Result<StreamMessage, broadcast::error::RecvError> {
    match stream {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn entity_loop(
    entity: SharedEntity,
    mut updates: watch::Receiver<u64>,
    mut stream: Option<broadcast::Receiver<StreamMessage>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let mut stream_closed = false;
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                entity.lock().await.handle_coordinator_update();
            }
            message = next_message(&mut stream) => match message {
                Ok(message) => {
                    entity.lock().await.handle_stream_update(&message);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => stream_closed = true,
            },
            _ = shutdown.changed() => break,
        }
        if stream_closed {
            stream = None;
        }
    }
}
