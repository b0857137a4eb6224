//! Vendor API seams
//!
//! The Teslemetry HTTP client is not part of this crate. Coordinators and
//! entities talk to it through the traits below, which mirror the endpoints
//! they need: vehicle summary and data, wake-up, vehicle commands, the
//! three energy site endpoints and energy site commands. Responses are the raw JSON bodies, including
//! the outer `{"response": ...}` envelope.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

mod command;
mod error;
mod types;

pub use command::{EnergyCommand, Seat, SunRoofCommand, Trunk, VehicleCommand, WindowCommand};
pub use error::{ApiError, ApiResult};
pub use types::{CabinOverheatProtectionTemp, Metadata, Scope, VehicleDataEndpoint, VehicleState};
use types::is_pre2021;

/// Per-vehicle API handle
#[async_trait]
pub trait VehicleApi: Send + Sync {
    /// Vehicle identification number
    fn vin(&self) -> &str;

    /// Whether this vehicle cannot fall asleep on its own while polled
    fn pre2021(&self) -> bool {
        is_pre2021(self.vin())
    }

    /// Summary status, `{"response": {"state": "online", ...}}`
    async fn vehicle(&self) -> ApiResult<Value>;

    /// Full vehicle data for the requested endpoints
    async fn vehicle_data(&self, endpoints: &[VehicleDataEndpoint]) -> ApiResult<Value>;

    /// Ask the vehicle to wake up; the response carries the new state
    async fn wake_up(&self) -> ApiResult<Value>;

    /// Send a vehicle command
    async fn command(&self, command: VehicleCommand) -> ApiResult<Value>;
}

/// Per-energy-site API handle
#[async_trait]
pub trait EnergyApi: Send + Sync {
    fn energy_site_id(&self) -> u64;

    async fn live_status(&self) -> ApiResult<Value>;

    async fn site_info(&self) -> ApiResult<Value>;

    /// Today's energy totals, `{"response": {"time_series": [...]}}`
    async fn energy_history(&self) -> ApiResult<Value>;

    /// Send a site command
    async fn command(&self, command: EnergyCommand) -> ApiResult<Value>;
}

/// Account-level API handle
#[async_trait]
pub trait TeslemetryApi: Send + Sync {
    /// Account uid, granted scopes and region
    async fn metadata(&self) -> ApiResult<Metadata>;

    /// Products (vehicles and energy sites) visible to the token
    async fn products(&self) -> ApiResult<Value>;

    /// Connectivity and subscription check
    async fn test(&self) -> ApiResult<Value>;

    fn vehicle(&self, vin: &str) -> Arc<dyn VehicleApi>;

    fn energy_site(&self, energy_site_id: u64) -> Arc<dyn EnergyApi>;
}

/// Unwrap the `response` member of a vendor body
pub fn response_of(body: &Value) -> ApiResult<&Value> {
    body.get("response").ok_or(ApiError::InvalidResponse)
}

/// Read the `state` string from a vehicle summary or wake-up body
pub fn state_of(body: &Value) -> ApiResult<VehicleState> {
    response_of(body)?
        .get("state")
        .and_then(Value::as_str)
        .map(VehicleState::from)
        .ok_or(ApiError::InvalidResponse)
}
