//! Integration lifecycle
//!
//! [`setup`] loads account metadata and products, builds a context per
//! vehicle and energy site, wires the push stream and runs the first energy
//! refresh. [`Bridge`] adds entities, persistence and polling on top and is
//! what a host normally starts and stops.

use crate::api::{ApiError, Metadata, Scope, TeslemetryApi, VehicleState, response_of};
use crate::config::Config;
use crate::coordinator::{
    Coordinator, EnergyHistoryCoordinator, EnergyInfoCoordinator, EnergyLiveCoordinator,
    VehicleDataCoordinator,
};
use crate::error::{BridgeError, Result};
use crate::helpers::{flatten_value, is_truthy};
use crate::hub::{EVENT_ALERT, EVENT_ERROR, Hub};
use crate::logging::{LogContext, get_logger, get_logger_with_context};
use crate::models::{BridgeData, DeviceInfo, EnergySiteContext, VehicleContext};
use crate::persistence::StateStore;
use crate::platform::{EntityRegistry, build_entities};
use crate::scheduler::Scheduler;
use crate::stream::{Connectivity, StreamMessage, StreamPayload, VehicleStream};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Map a vendor failure during setup to the host's retry semantics
fn setup_error(hub: &Hub, err: ApiError) -> BridgeError {
    match err {
        ApiError::InvalidToken => {
            hub.request_reauth();
            BridgeError::auth(err.message())
        }
        other => BridgeError::not_ready(other.message()),
    }
}

/// Load the account and build its runtime context
pub async fn setup(
    api: Arc<dyn TeslemetryApi>,
    stream: Arc<dyn VehicleStream>,
    hub: Arc<Hub>,
    config: &Config,
) -> Result<BridgeData> {
    let logger = get_logger("setup");

    let (metadata, products) = tokio::join!(api.metadata(), api.products());
    let Metadata { uid, scopes, region } = metadata.map_err(|e| setup_error(&hub, e))?;
    let products = products.map_err(|e| setup_error(&hub, e))?;
    let products = match response_of(&products) {
        Ok(Value::Array(items)) => items.clone(),
        _ => {
            logger.error("Invalid response from Teslemetry");
            return Err(BridgeError::not_ready("Invalid response from Teslemetry"));
        }
    };

    let mut vehicles = Vec::new();
    let mut energysites = Vec::new();

    for mut product in products {
        if let Some(vin) = product.get("vin").and_then(Value::as_str).map(str::to_string)
            && scopes.contains(&Scope::VehicleDeviceData)
        {
            if let Some(obj) = product.as_object_mut() {
                obj.remove("cached_data");
            }
            let vehicle_api = api.vehicle(&vin);
            let coordinator = Arc::new(VehicleDataCoordinator::new(
                vehicle_api.clone(),
                &product,
                hub.clone(),
                config,
            ));
            let display_name = product
                .get("display_name")
                .and_then(Value::as_str)
                .unwrap_or(&vin);
            let device = DeviceInfo::vehicle(&vin, display_name);
            vehicles.push(Arc::new(VehicleContext::new(
                vehicle_api,
                coordinator,
                stream.clone(),
                device,
            )));
        } else if let Some(site_id) = product.get("energy_site_id").and_then(Value::as_u64)
            && scopes.contains(&Scope::EnergyDeviceData)
        {
            let components = product.get("components");
            let powerwall = is_truthy(components.and_then(|c| c.get("battery")))
                || is_truthy(components.and_then(|c| c.get("solar")));
            let wall_connector = components.is_some_and(|c| c.get("wall_connectors").is_some());
            if !powerwall && !wall_connector {
                logger.debug(&format!(
                    "Skipping Energy Site {} as it has no components",
                    site_id
                ));
                continue;
            }

            let site_api = api.energy_site(site_id);
            let site_name = product
                .get("site_name")
                .and_then(Value::as_str)
                .unwrap_or("Energy Site");
            energysites.push(EnergySiteContext {
                live_coordinator: Arc::new(EnergyLiveCoordinator::new(
                    site_api.clone(),
                    hub.clone(),
                    config,
                )),
                info_coordinator: Arc::new(EnergyInfoCoordinator::new(
                    site_api.clone(),
                    &product,
                    hub.clone(),
                    config,
                )),
                history_coordinator: powerwall.then(|| {
                    Arc::new(EnergyHistoryCoordinator::new(
                        site_api.clone(),
                        hub.clone(),
                        config,
                    ))
                }),
                api: site_api,
                id: site_id,
                device: DeviceInfo::energy_site(site_id, site_name),
            });
        }
    }

    if config.streaming.enabled && stream.server().is_some() {
        for vehicle in &vehicles {
            let handle = tokio::spawn(stream_listener(vehicle.clone(), stream.subscribe()));
            vehicle.add_teardown(handle);
        }
    } else if !vehicles.is_empty() {
        logger.info("Streaming is not available, relying on polling");
    }

    for site in &mut energysites {
        for coordinator in site.coordinators() {
            coordinator.refresh().await.map_err(|e| {
                if e.is_auth() {
                    e
                } else {
                    BridgeError::not_ready(format!("{}: {}", coordinator.core().name(), e))
                }
            })?;
        }
        if let Some(model) = site_model(&site.info_coordinator.core().data()) {
            site.device.model = Some(model);
        }
    }

    logger.info(&format!(
        "Loaded {} vehicles and {} energy sites for {}",
        vehicles.len(),
        energysites.len(),
        uid
    ));

    Ok(BridgeData {
        uid,
        region,
        vehicles,
        energysites: energysites.into_iter().map(Arc::new).collect(),
        scopes,
        api,
        hub,
    })
}

/// Gateway and battery part names, in order of appearance
fn site_model(info: &serde_json::Map<String, Value>) -> Option<String> {
    let mut models: Vec<&str> = Vec::new();
    for key in ["components_gateways", "components_batteries"] {
        let Some(Value::Array(parts)) = info.get(key) else {
            continue;
        };
        for name in parts
            .iter()
            .filter_map(|p| p.get("part_name").and_then(Value::as_str))
        {
            if !name.is_empty() && !models.contains(&name) {
                models.push(name);
            }
        }
    }
    (!models.is_empty()).then(|| models.join(", "))
}

/// Stop stream listeners; returns how many were running
pub fn unload(data: &BridgeData) -> usize {
    let stopped: usize = data.vehicles.iter().map(|v| v.teardown()).sum();
    get_logger("setup").info(&format!("Stopped {} stream listeners", stopped));
    stopped
}

async fn stream_listener(vehicle: Arc<VehicleContext>, mut rx: broadcast::Receiver<StreamMessage>) {
    let logger = get_logger_with_context(LogContext::new("stream").with_vin(&vehicle.vin));
    loop {
        match rx.recv().await {
            Ok(message) => handle_stream_message(&vehicle, &message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                logger.warn(&format!("Stream listener lagged, skipped {} messages", skipped));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn parse_timestamp(item: &Value, key: &str) -> Option<DateTime<Utc>> {
    item.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Fire an event for every item newer than `watermark`; returns the new watermark
///
/// Items arrive newest first, so the first already-seen item ends the scan.
fn fire_new(
    hub: &Hub,
    event_type: &str,
    vin: &str,
    items: &[Value],
    time_key: &str,
    watermark: DateTime<Utc>,
) -> DateTime<Utc> {
    for item in items {
        let Some(at) = parse_timestamp(item, time_key) else {
            continue;
        };
        if at <= watermark {
            break;
        }
        let mut event = item.clone();
        if let Some(obj) = event.as_object_mut() {
            obj.insert("vin".to_string(), Value::from(vin));
        }
        hub.fire(event_type, event);
    }
    items
        .first()
        .and_then(|item| parse_timestamp(item, time_key))
        .map_or(watermark, |newest| newest.max(watermark))
}

/// Apply one stream message to a vehicle's coordinator and event bus
pub fn handle_stream_message(vehicle: &VehicleContext, message: &StreamMessage) {
    if message.vin != vehicle.vin {
        return;
    }
    let core = vehicle.coordinator.core();
    match &message.payload {
        StreamPayload::Alerts(alerts) => {
            let watermark = fire_new(
                core.hub(),
                EVENT_ALERT,
                &vehicle.vin,
                alerts,
                "startedAt",
                vehicle.last_alert(),
            );
            vehicle.set_last_alert(watermark);
        }
        StreamPayload::Errors(errors) => {
            let watermark = fire_new(
                core.hub(),
                EVENT_ERROR,
                &vehicle.vin,
                errors,
                "createdAt",
                vehicle.last_error(),
            );
            vehicle.set_last_error(watermark);
        }
        StreamPayload::VehicleData(data) => {
            core.mark_updated_once();
            core.merge_data(flatten_value(data));
        }
        StreamPayload::State(state) => {
            core.set_state(&VehicleState::from(state.as_str()));
            core.notify();
        }
        StreamPayload::Connectivity(status) => {
            let state = match status {
                Connectivity::Connected => VehicleState::Online,
                Connectivity::Disconnected => VehicleState::Offline,
            };
            core.set_state(&state);
            core.notify();
        }
        StreamPayload::Data(_) => {}
    }
}

/// A running account: context, entities, polling and persistence
pub struct Bridge {
    pub data: BridgeData,
    pub entities: EntityRegistry,
    scheduler: Scheduler,
    store: Option<StateStore>,
}

impl Bridge {
    pub async fn start(
        api: Arc<dyn TeslemetryApi>,
        stream: Arc<dyn VehicleStream>,
        hub: Arc<Hub>,
        config: &Config,
    ) -> Result<Self> {
        let logger = get_logger("bridge");
        let data = setup(api, stream, hub, config).await?;

        let mut entities = EntityRegistry::new();
        entities.extend(build_entities(&data, config))?;

        let store = if config.persistence.enabled {
            let mut store = StateStore::new(&config.persistence.state_file);
            if let Err(e) = store.load() {
                logger.warn(&format!("Ignoring saved entity states: {}", e));
            }
            let restored = entities.restore(&store).await;
            logger.debug(&format!("Restored {} entities", restored));
            Some(store)
        } else {
            None
        };

        entities.write_all().await;
        entities.start(&data, config.streaming.enabled).await;

        let mut scheduler = Scheduler::new();
        scheduler.spawn_all(&data);

        logger.info(&format!("Bridge started with {} entities", entities.len()));
        Ok(Self {
            data,
            entities,
            scheduler,
            store,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Stop polling, entity tasks and listeners; save states when enabled
    pub async fn stop(mut self) -> Result<()> {
        self.scheduler.shutdown().await;
        self.entities.shutdown().await;
        unload(&self.data);
        if let Some(mut store) = self.store.take() {
            store.capture(&self.data.hub);
            store.save()?;
        }
        Ok(())
    }
}
