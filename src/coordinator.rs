//! Polling coordinators
//!
//! A coordinator owns a cached snapshot for one vendor endpoint family,
//! refreshes it on an interval and classifies vendor failures. Entities read
//! the snapshot and subscribe to change notifications.

use crate::api::VehicleState;
use crate::error::Result;
use crate::helpers::Snapshot;
use crate::hub::Hub;
use crate::logging::StructuredLogger;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;

mod energy;
mod failure;
mod sleep;
mod vehicle;

pub use energy::{
    ENERGY_HISTORY_FIELDS, EnergyHistoryCoordinator, EnergyInfoCoordinator, EnergyLiveCoordinator,
    normalize_wall_connectors, sum_history,
};
pub use failure::{FailureCounter, Handling, handle_api_error};
pub use sleep::{Cadence, SleepPolicy, VehicleActivity};
pub use vehicle::{Clock, VEHICLE_ENDPOINTS, VehicleDataCoordinator};

/// State shared by every coordinator kind
pub struct CoordinatorCore {
    name: String,
    hub: Arc<Hub>,
    logger: StructuredLogger,
    data: RwLock<Snapshot>,
    last_update_success: AtomicBool,
    updated_once: AtomicBool,
    interval: Mutex<Duration>,
    changed: watch::Sender<u64>,
}

impl CoordinatorCore {
    pub fn new(
        name: String,
        hub: Arc<Hub>,
        logger: StructuredLogger,
        interval: Duration,
        initial: Snapshot,
    ) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            name,
            hub,
            logger,
            data: RwLock::new(initial),
            last_update_success: AtomicBool::new(true),
            updated_once: AtomicBool::new(false),
            interval: Mutex::new(interval),
            changed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Copy of the current snapshot
    pub fn data(&self) -> Snapshot {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Set one field without notifying listeners
    pub fn set_field(&self, key: &str, value: Value) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub fn state(&self) -> VehicleState {
        match self.get("state") {
            Some(Value::String(s)) => VehicleState::from(s.as_str()),
            _ => VehicleState::Unknown(String::new()),
        }
    }

    pub fn set_state(&self, state: &VehicleState) {
        self.set_field("state", Value::String(state.as_str().to_string()));
    }

    /// Merge fields into the snapshot and notify listeners
    ///
    /// Fields absent from `data` keep their current value.
    pub fn merge_data(&self, data: Snapshot) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(data);
        self.mark_success();
    }

    /// Mark the last refresh as successful and notify listeners
    pub fn mark_success(&self) {
        self.last_update_success.store(true, Ordering::SeqCst);
        self.notify();
    }

    /// Mark the last refresh as failed and notify listeners
    pub fn set_failed(&self) {
        self.last_update_success.store(false, Ordering::SeqCst);
        self.notify();
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    /// Whether full data has been received at least once
    pub fn updated_once(&self) -> bool {
        self.updated_once.load(Ordering::SeqCst)
    }

    pub fn mark_updated_once(&self) {
        self.updated_once.store(true, Ordering::SeqCst);
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner) = interval;
    }

    pub fn notify(&self) {
        self.changed.send_modify(|generation| *generation += 1);
    }

    /// Receiver that changes on every data or failure notification
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }
}

#[async_trait]
pub trait Coordinator: Send + Sync {
    fn core(&self) -> &CoordinatorCore;

    /// Fetch and shape new data; `None` keeps the current snapshot
    async fn update(&self) -> Result<Option<Snapshot>>;

    /// Run one update and store its outcome
    async fn refresh(&self) -> Result<()> {
        match self.update().await {
            Ok(Some(data)) => {
                self.core().merge_data(data);
                Ok(())
            }
            Ok(None) => {
                self.core().mark_success();
                Ok(())
            }
            Err(err) => {
                let core = self.core();
                if err.is_auth() {
                    core.hub().request_reauth();
                }
                core.logger()
                    .warn(&format!("{} refresh failed: {}", core.name(), err));
                core.set_failed();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::get_logger;
    use serde_json::json;

    fn core() -> CoordinatorCore {
        let mut initial = Snapshot::new();
        initial.insert("state".to_string(), json!("asleep"));
        CoordinatorCore::new(
            "test".to_string(),
            Arc::new(Hub::new()),
            get_logger("coordinator"),
            Duration::from_secs(30),
            initial,
        )
    }

    #[test]
    fn test_state_accessors() {
        let core = core();
        assert_eq!(core.state(), VehicleState::Asleep);
        core.set_state(&VehicleState::Online);
        assert_eq!(core.get("state"), Some(json!("online")));
    }

    #[test]
    fn test_merge_data_notifies_and_restores_success() {
        let core = core();
        let rx = core.subscribe();
        core.set_failed();
        assert!(!core.last_update_success());

        let mut data = Snapshot::new();
        data.insert("charge_state_battery_level".to_string(), json!(80));
        core.merge_data(data);
        assert!(core.last_update_success());
        assert_eq!(core.get("state"), Some(json!("asleep")));
        assert_eq!(core.get("charge_state_battery_level"), Some(json!(80)));
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn test_merge_data_overwrites_present_fields() {
        let core = core();
        let mut data = Snapshot::new();
        data.insert("state".to_string(), json!("online"));
        core.merge_data(data);
        assert_eq!(core.state(), VehicleState::Online);
    }
}
