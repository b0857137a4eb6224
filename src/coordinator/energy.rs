use super::failure::{FailureCounter, Handling, handle_api_error};
use super::{Coordinator, CoordinatorCore};
use crate::api::{ApiResult, EnergyApi, response_of};
use crate::config::Config;
use crate::error::Result;
use crate::helpers::{Snapshot, flatten, flatten_value, object_or_empty};
use crate::hub::{EVENT_LIVE_STATUS, EVENT_SITE_INFO, Hub};
use crate::logging::{LogContext, get_logger_with_context};
use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

/// Counters summed by the history coordinator
pub const ENERGY_HISTORY_FIELDS: [&str; 21] = [
    "solar_energy_exported",
    "generator_energy_exported",
    "grid_energy_imported",
    "grid_services_energy_imported",
    "grid_services_energy_exported",
    "grid_energy_exported_from_solar",
    "grid_energy_exported_from_generator",
    "grid_energy_exported_from_battery",
    "battery_energy_exported",
    "battery_energy_imported_from_grid",
    "battery_energy_imported_from_solar",
    "battery_energy_imported_from_generator",
    "consumer_energy_imported_from_grid",
    "consumer_energy_imported_from_solar",
    "consumer_energy_imported_from_battery",
    "consumer_energy_imported_from_generator",
    "total_home_usage",
    "total_battery_charge",
    "total_battery_discharge",
    "total_solar_generation",
    "total_grid_energy_exported",
];

/// Key wall connectors by `din`; records without one are dropped
pub fn normalize_wall_connectors(value: Option<&Value>) -> Map<String, Value> {
    let mut connectors = Map::new();
    if let Some(Value::Array(items)) = value {
        for item in items {
            if let Some(din) = item.get("din").and_then(Value::as_str) {
                connectors.insert(din.to_string(), item.clone());
            }
        }
    }
    connectors
}

/// Sum every `time_series` bucket over [`ENERGY_HISTORY_FIELDS`]
pub fn sum_history(data: &Map<String, Value>) -> Snapshot {
    let mut totals = [0.0f64; ENERGY_HISTORY_FIELDS.len()];
    if let Some(Value::Array(buckets)) = data.get("time_series") {
        for bucket in buckets {
            for (total, key) in totals.iter_mut().zip(ENERGY_HISTORY_FIELDS) {
                if let Some(value) = bucket.get(key).and_then(Value::as_f64) {
                    *total += value;
                }
            }
        }
    }
    ENERGY_HISTORY_FIELDS
        .iter()
        .zip(totals)
        .map(|(key, total)| (key.to_string(), number(total)))
        .collect()
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn zero_history() -> Snapshot {
    sum_history(&Map::new())
}

fn site_logger(site_id: u64) -> crate::logging::StructuredLogger {
    get_logger_with_context(LogContext::new("coordinator").with_site_id(site_id))
}

/// Unwrap an energy endpoint body
///
/// `Ok(None)` keeps the previous snapshot. A response that is not an object
/// becomes an empty map.
fn energy_response(
    core: &CoordinatorCore,
    failures: &FailureCounter,
    site_id: u64,
    result: ApiResult<Value>,
) -> Result<Option<Map<String, Value>>> {
    let outcome = result.and_then(|body| response_of(&body).map(|r| object_or_empty(Some(r))));
    match outcome {
        Ok(data) => {
            failures.reset();
            Ok(Some(data))
        }
        Err(err) => match handle_api_error(
            &err,
            failures,
            core.hub(),
            &site_id.to_string(),
            core.logger(),
        ) {
            Handling::KeepStale => Ok(None),
            Handling::Fail(err) => Err(err),
        },
    }
}

/// Live power flow of an energy site
pub struct EnergyLiveCoordinator {
    core: CoordinatorCore,
    api: Arc<dyn EnergyApi>,
    failures: FailureCounter,
}

impl EnergyLiveCoordinator {
    pub fn new(api: Arc<dyn EnergyApi>, hub: Arc<Hub>, config: &Config) -> Self {
        let site_id = api.energy_site_id();
        Self {
            core: CoordinatorCore::new(
                format!("Teslemetry Energy Site Live {}", site_id),
                hub,
                site_logger(site_id),
                config.polling.energy_live_interval(),
                Snapshot::new(),
            ),
            api,
            failures: FailureCounter::new(config.polling.failure_threshold),
        }
    }

    /// Live data for one wall connector
    pub fn wall_connector(&self, din: &str) -> Option<Value> {
        self.core
            .get("wall_connectors")
            .and_then(|wcs| wcs.get(din).cloned())
    }
}

#[async_trait]
impl Coordinator for EnergyLiveCoordinator {
    fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    async fn update(&self) -> Result<Option<Snapshot>> {
        let site_id = self.api.energy_site_id();
        let result = self.api.live_status().await;
        let Some(mut data) = energy_response(&self.core, &self.failures, site_id, result)? else {
            return Ok(None);
        };

        self.core
            .hub()
            .fire(EVENT_LIVE_STATUS, Value::Object(data.clone()));

        let connectors = normalize_wall_connectors(data.get("wall_connectors"));
        data.insert("wall_connectors".to_string(), Value::Object(connectors));
        Ok(Some(data))
    }
}

/// Site configuration and component details
pub struct EnergyInfoCoordinator {
    core: CoordinatorCore,
    api: Arc<dyn EnergyApi>,
    failures: FailureCounter,
}

impl EnergyInfoCoordinator {
    /// Start from the product listing entry for this site
    pub fn new(api: Arc<dyn EnergyApi>, product: &Value, hub: Arc<Hub>, config: &Config) -> Self {
        let site_id = api.energy_site_id();
        Self {
            core: CoordinatorCore::new(
                format!("Teslemetry Energy Site Info {}", site_id),
                hub,
                site_logger(site_id),
                config.polling.energy_info_interval(),
                flatten_value(product),
            ),
            api,
            failures: FailureCounter::new(config.polling.failure_threshold),
        }
    }
}

#[async_trait]
impl Coordinator for EnergyInfoCoordinator {
    fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    async fn update(&self) -> Result<Option<Snapshot>> {
        let site_id = self.api.energy_site_id();
        let result = self.api.site_info().await;
        let Some(data) = energy_response(&self.core, &self.failures, site_id, result)? else {
            return Ok(None);
        };

        self.core
            .hub()
            .fire(EVENT_SITE_INFO, Value::Object(data.clone()));
        Ok(Some(flatten(&data)))
    }
}

/// Today's energy counters, summed across time buckets
pub struct EnergyHistoryCoordinator {
    core: CoordinatorCore,
    api: Arc<dyn EnergyApi>,
    failures: FailureCounter,
}

impl EnergyHistoryCoordinator {
    pub fn new(api: Arc<dyn EnergyApi>, hub: Arc<Hub>, config: &Config) -> Self {
        let site_id = api.energy_site_id();
        Self {
            core: CoordinatorCore::new(
                format!("Teslemetry Energy History {}", site_id),
                hub,
                site_logger(site_id),
                config.polling.energy_history_interval(),
                zero_history(),
            ),
            api,
            failures: FailureCounter::new(config.polling.failure_threshold),
        }
    }
}

#[async_trait]
impl Coordinator for EnergyHistoryCoordinator {
    fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    async fn update(&self) -> Result<Option<Snapshot>> {
        let site_id = self.api.energy_site_id();
        let result = self.api.energy_history().await;
        Ok(energy_response(&self.core, &self.failures, site_id, result)?
            .map(|data| sum_history(&data)))
    }
}
