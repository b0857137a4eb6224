//! Runtime context for one configured account
//!
//! `setup` builds a [`BridgeData`] holding one context per vehicle and per
//! energy site; `unload` tears it down again.

use crate::api::{EnergyApi, Scope, TeslemetryApi, VehicleApi, state_of};
use crate::config::WakeConfig;
use crate::coordinator::{
    Coordinator, EnergyHistoryCoordinator, EnergyInfoCoordinator, EnergyLiveCoordinator,
    VehicleDataCoordinator,
};
use crate::error::{BridgeError, Result};
use crate::hub::Hub;
use crate::logging::{LogContext, get_logger_with_context};
use crate::stream::VehicleStream;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const MANUFACTURER: &str = "Tesla";
pub const CONFIGURATION_URL: &str = "https://teslemetry.com/console";

/// Vehicle model from the fourth VIN character
pub fn model_from_vin(vin: &str) -> Option<&'static str> {
    match vin.chars().nth(3)? {
        'S' => Some("Model S"),
        '3' => Some("Model 3"),
        'X' => Some("Model X"),
        'Y' => Some("Model Y"),
        _ => None,
    }
}

/// Device registry entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub manufacturer: String,
    pub name: String,
    pub model: Option<String>,
    pub serial_number: String,
    pub configuration_url: String,
    /// Parent device, for wall connectors behind an energy site
    pub via_device: Option<String>,
}

impl DeviceInfo {
    pub fn vehicle(vin: &str, display_name: &str) -> Self {
        Self {
            identifier: vin.to_string(),
            manufacturer: MANUFACTURER.to_string(),
            name: display_name.to_string(),
            model: model_from_vin(vin).map(str::to_string),
            serial_number: vin.to_string(),
            configuration_url: CONFIGURATION_URL.to_string(),
            via_device: None,
        }
    }

    pub fn energy_site(site_id: u64, site_name: &str) -> Self {
        Self {
            identifier: site_id.to_string(),
            manufacturer: MANUFACTURER.to_string(),
            name: site_name.to_string(),
            model: None,
            serial_number: site_id.to_string(),
            configuration_url: CONFIGURATION_URL.to_string(),
            via_device: None,
        }
    }

    /// Serial number is the last dash-separated part of the din
    pub fn wall_connector(site_id: u64, din: &str, model: Option<String>) -> Self {
        Self {
            identifier: din.to_string(),
            manufacturer: MANUFACTURER.to_string(),
            name: "Wall Connector".to_string(),
            model,
            serial_number: din.rsplit('-').next().unwrap_or(din).to_string(),
            configuration_url: CONFIGURATION_URL.to_string(),
            via_device: Some(site_id.to_string()),
        }
    }
}

/// Everything one vehicle needs at runtime
pub struct VehicleContext {
    pub api: Arc<dyn VehicleApi>,
    pub coordinator: Arc<VehicleDataCoordinator>,
    pub stream: Arc<dyn VehicleStream>,
    pub vin: String,
    pub device: DeviceInfo,
    /// Serializes wake-up sequences
    pub wakelock: tokio::sync::Mutex<()>,
    last_alert: Mutex<DateTime<Utc>>,
    last_error: Mutex<DateTime<Utc>>,
    teardown: Mutex<Vec<JoinHandle<()>>>,
}

impl VehicleContext {
    pub fn new(
        api: Arc<dyn VehicleApi>,
        coordinator: Arc<VehicleDataCoordinator>,
        stream: Arc<dyn VehicleStream>,
        device: DeviceInfo,
    ) -> Self {
        let now = Utc::now();
        Self {
            vin: api.vin().to_string(),
            api,
            coordinator,
            stream,
            device,
            wakelock: tokio::sync::Mutex::new(()),
            last_alert: Mutex::new(now),
            last_error: Mutex::new(now),
            teardown: Mutex::new(Vec::new()),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        self.coordinator.core().hub()
    }

    pub fn last_alert(&self) -> DateTime<Utc> {
        *self.last_alert.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_last_alert(&self, at: DateTime<Utc>) {
        *self.last_alert.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn last_error(&self) -> DateTime<Utc> {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_last_error(&self, at: DateTime<Utc>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Register a task to abort on unload
    pub fn add_teardown(&self, handle: JoinHandle<()>) {
        self.teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Abort registered tasks; returns how many there were
    pub fn teardown(&self) -> usize {
        let handles: Vec<_> = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    /// Wake the vehicle unless the cached state already says online
    ///
    /// Holds the wake lock for the whole sequence. The first attempt sends a
    /// wake-up, later attempts only poll the summary, sleeping
    /// `attempt * backoff_step` in between.
    pub async fn wake_up(&self, wake: &WakeConfig) -> Result<()> {
        let _guard = self.wakelock.lock().await;
        let core = self.coordinator.core();
        let logger = get_logger_with_context(LogContext::new("wake").with_vin(&self.vin));
        let mut attempts: u32 = 0;

        while !core.state().is_online() {
            let body = if attempts == 0 {
                logger.debug("Sending wake up");
                self.api.wake_up().await
            } else {
                self.api.vehicle().await
            }
            .map_err(|e| BridgeError::command(e.message()))?;
            let state = state_of(&body).map_err(|e| BridgeError::command(e.message()))?;
            core.set_state(&state);

            if !state.is_online() {
                attempts += 1;
                if attempts >= wake.max_attempts {
                    logger.warn("Could not wake up vehicle");
                    return Err(BridgeError::command("Could not wake up vehicle"));
                }
                let backoff = Duration::from_secs(wake.backoff_step_secs * u64::from(attempts));
                tokio::time::sleep(backoff).await;
            }
        }
        Ok(())
    }
}

/// Everything one energy site needs at runtime
pub struct EnergySiteContext {
    pub api: Arc<dyn EnergyApi>,
    pub live_coordinator: Arc<EnergyLiveCoordinator>,
    pub info_coordinator: Arc<EnergyInfoCoordinator>,
    /// Only sites with a battery or solar have history
    pub history_coordinator: Option<Arc<EnergyHistoryCoordinator>>,
    pub id: u64,
    pub device: DeviceInfo,
}

impl EnergySiteContext {
    /// All coordinators of this site
    pub fn coordinators(&self) -> Vec<Arc<dyn Coordinator>> {
        let mut all: Vec<Arc<dyn Coordinator>> = vec![
            self.live_coordinator.clone(),
            self.info_coordinator.clone(),
        ];
        if let Some(history) = &self.history_coordinator {
            all.push(history.clone());
        }
        all
    }
}

/// Runtime data of one configured account
pub struct BridgeData {
    pub uid: String,
    pub region: String,
    pub vehicles: Vec<Arc<VehicleContext>>,
    pub energysites: Vec<Arc<EnergySiteContext>>,
    pub scopes: Vec<Scope>,
    pub api: Arc<dyn TeslemetryApi>,
    pub hub: Arc<Hub>,
}

impl BridgeData {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn vehicle(&self, vin: &str) -> Option<&Arc<VehicleContext>> {
        self.vehicles.iter().find(|v| v.vin == vin)
    }
}
