use super::failure::{FailureCounter, Handling, handle_api_error};
use super::sleep::{Cadence, SleepPolicy, VehicleActivity};
use super::{Coordinator, CoordinatorCore};
use crate::api::{
    ApiError, ApiResult, VehicleApi, VehicleDataEndpoint, VehicleState, response_of, state_of,
};
use crate::config::Config;
use crate::error::Result;
use crate::helpers::{Snapshot, flatten_value};
use crate::hub::{EVENT_VEHICLE_DATA, Hub};
use crate::logging::{LogContext, get_logger_with_context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Sections requested on every vehicle poll
pub const VEHICLE_ENDPOINTS: [VehicleDataEndpoint; 6] = [
    VehicleDataEndpoint::ChargeState,
    VehicleDataEndpoint::ClimateState,
    VehicleDataEndpoint::DriveState,
    VehicleDataEndpoint::LocationData,
    VehicleDataEndpoint::VehicleState,
    VehicleDataEndpoint::VehicleConfig,
];

/// Wall clock source, replaceable in tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Polls full vehicle data without waking a sleeping vehicle
pub struct VehicleDataCoordinator {
    core: CoordinatorCore,
    api: Arc<dyn VehicleApi>,
    failures: FailureCounter,
    pre2021: bool,
    sleep: Mutex<SleepPolicy>,
    normal_interval: Duration,
    wait_interval: Duration,
    clock: Clock,
}

impl VehicleDataCoordinator {
    /// Start from the product listing entry for this vehicle
    pub fn new(api: Arc<dyn VehicleApi>, product: &Value, hub: Arc<Hub>, config: &Config) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        Self::with_clock(api, product, hub, config, clock)
    }

    pub fn with_clock(
        api: Arc<dyn VehicleApi>,
        product: &Value,
        hub: Arc<Hub>,
        config: &Config,
        clock: Clock,
    ) -> Self {
        let vin = api.vin().to_string();
        let logger = get_logger_with_context(LogContext::new("coordinator").with_vin(&vin));
        let pre2021 = api.pre2021();
        if pre2021 {
            logger.info(&format!("Teslemetry will let {} sleep", vin));
        }
        let normal_interval = config.polling.vehicle_interval();
        let core = CoordinatorCore::new(
            format!("Teslemetry Vehicle {}", vin),
            hub,
            logger,
            normal_interval,
            flatten_value(product),
        );
        let sleep = SleepPolicy::from_config(&config.sleep, clock());
        Self {
            core,
            api,
            failures: FailureCounter::new(config.polling.failure_threshold),
            pre2021,
            sleep: Mutex::new(sleep),
            normal_interval,
            wait_interval: config.polling.vehicle_wait(),
            clock,
        }
    }

    pub fn api(&self) -> &Arc<dyn VehicleApi> {
        &self.api
    }

    pub fn vin(&self) -> &str {
        self.api.vin()
    }

    pub fn failures(&self) -> u32 {
        self.failures.count()
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.sleep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_active()
    }

    /// Full data when the vehicle is online, `None` when it is not
    async fn fetch(&self) -> ApiResult<Option<Value>> {
        if !self.core.state().is_online() {
            let body = self.api.vehicle().await?;
            self.core.set_state(&state_of(&body)?);
        }
        if !self.core.state().is_online() {
            return Ok(None);
        }

        let body = self.api.vehicle_data(&VEHICLE_ENDPOINTS).await?;
        match response_of(&body)? {
            data @ Value::Object(_) => Ok(Some(data.clone())),
            _ => Err(ApiError::InvalidResponse),
        }
    }

    fn apply_cadence(&self, data: &Value) {
        let activity = VehicleActivity::from_vehicle_data(data);
        let cadence = self
            .sleep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(activity.is_active(), (self.clock)());
        match cadence {
            Cadence::Normal => {
                if activity.is_active() {
                    self.core.logger().debug("Vehicle is active");
                }
                self.core.set_interval(self.normal_interval);
            }
            Cadence::Extended => {
                self.core.logger().debug("Starting sleep period");
                self.core.set_interval(self.wait_interval);
            }
        }
    }
}

#[async_trait]
impl Coordinator for VehicleDataCoordinator {
    fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    async fn update(&self) -> Result<Option<Snapshot>> {
        self.core.set_interval(self.normal_interval);

        let data = match self.fetch().await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(None),
            Err(ApiError::VehicleOffline) => {
                self.core.set_state(&VehicleState::Offline);
                return Ok(None);
            }
            Err(err) => {
                return match handle_api_error(
                    &err,
                    &self.failures,
                    self.core.hub(),
                    self.api.vin(),
                    self.core.logger(),
                ) {
                    Handling::KeepStale => Ok(None),
                    Handling::Fail(err) => Err(err),
                };
            }
        };

        self.failures.reset();
        self.core.hub().fire(EVENT_VEHICLE_DATA, data.clone());

        if self.pre2021 {
            self.apply_cadence(&data);
        }

        self.core.mark_updated_once();
        Ok(Some(flatten_value(&data)))
    }
}
