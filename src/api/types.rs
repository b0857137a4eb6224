use super::error::{ApiError, ApiResult};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Wake state reported for a vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleState {
    Online,
    Asleep,
    Offline,
    Unknown(String),
}

impl VehicleState {
    pub fn as_str(&self) -> &str {
        match self {
            VehicleState::Online => "online",
            VehicleState::Asleep => "asleep",
            VehicleState::Offline => "offline",
            VehicleState::Unknown(s) => s,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, VehicleState::Online)
    }
}

impl From<&str> for VehicleState {
    fn from(s: &str) -> Self {
        match s {
            "online" => VehicleState::Online,
            "asleep" => VehicleState::Asleep,
            "offline" => VehicleState::Offline,
            other => VehicleState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth scopes granted to the access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    OpenId,
    OfflineAccess,
    UserData,
    VehicleDeviceData,
    VehicleLocation,
    VehicleCmds,
    VehicleChargingCmds,
    EnergyDeviceData,
    EnergyCmds,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::OpenId => "openid",
            Scope::OfflineAccess => "offline_access",
            Scope::UserData => "user_data",
            Scope::VehicleDeviceData => "vehicle_device_data",
            Scope::VehicleLocation => "vehicle_location",
            Scope::VehicleCmds => "vehicle_cmds",
            Scope::VehicleChargingCmds => "vehicle_charging_cmds",
            Scope::EnergyDeviceData => "energy_device_data",
            Scope::EnergyCmds => "energy_cmds",
        }
    }
}

impl FromStr for Scope {
    type Err = ApiError;

    fn from_str(s: &str) -> ApiResult<Self> {
        Ok(match s {
            "openid" => Scope::OpenId,
            "offline_access" => Scope::OfflineAccess,
            "user_data" => Scope::UserData,
            "vehicle_device_data" => Scope::VehicleDeviceData,
            "vehicle_location" => Scope::VehicleLocation,
            "vehicle_cmds" => Scope::VehicleCmds,
            "vehicle_charging_cmds" => Scope::VehicleChargingCmds,
            "energy_device_data" => Scope::EnergyDeviceData,
            "energy_cmds" => Scope::EnergyCmds,
            other => return Err(ApiError::other("unknown_scope", other)),
        })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account metadata returned by the vendor
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub uid: String,
    pub scopes: Vec<Scope>,
    pub region: String,
}

impl Metadata {
    /// Parse the metadata body; unknown scopes are ignored
    pub fn from_json(body: &Value) -> ApiResult<Self> {
        let uid = body
            .get("uid")
            .and_then(Value::as_str)
            .ok_or(ApiError::InvalidResponse)?;
        let region = body
            .get("region")
            .and_then(Value::as_str)
            .ok_or(ApiError::InvalidResponse)?;
        let scopes = body
            .get("scopes")
            .and_then(Value::as_array)
            .ok_or(ApiError::InvalidResponse)?
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|s| s.parse().ok())
            .collect();
        Ok(Self {
            uid: uid.to_string(),
            scopes,
            region: region.to_string(),
        })
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// Sections of the full vehicle data request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleDataEndpoint {
    ChargeState,
    ClimateState,
    ClosuresState,
    DriveState,
    GuiSettings,
    LocationData,
    VehicleConfig,
    VehicleState,
}

impl VehicleDataEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleDataEndpoint::ChargeState => "charge_state",
            VehicleDataEndpoint::ClimateState => "climate_state",
            VehicleDataEndpoint::ClosuresState => "closures_state",
            VehicleDataEndpoint::DriveState => "drive_state",
            VehicleDataEndpoint::GuiSettings => "gui_settings",
            VehicleDataEndpoint::LocationData => "location_data",
            VehicleDataEndpoint::VehicleConfig => "vehicle_config",
            VehicleDataEndpoint::VehicleState => "vehicle_state",
        }
    }
}

/// Cabin overheat protection activation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CabinOverheatProtectionTemp {
    Low,
    Medium,
    High,
}

impl CabinOverheatProtectionTemp {
    /// Command argument sent to the vehicle
    pub fn index(&self) -> u8 {
        match self {
            CabinOverheatProtectionTemp::Low => 0,
            CabinOverheatProtectionTemp::Medium => 1,
            CabinOverheatProtectionTemp::High => 2,
        }
    }

    /// Activation temperature in Celsius
    pub fn celsius(&self) -> f64 {
        match self {
            CabinOverheatProtectionTemp::Low => 30.0,
            CabinOverheatProtectionTemp::Medium => 35.0,
            CabinOverheatProtectionTemp::High => 40.0,
        }
    }

    /// Level for an exact activation temperature
    pub fn from_celsius(temp: f64) -> Option<Self> {
        [
            CabinOverheatProtectionTemp::Low,
            CabinOverheatProtectionTemp::Medium,
            CabinOverheatProtectionTemp::High,
        ]
        .into_iter()
        .find(|level| level.celsius() == temp)
    }

    /// Level named in vehicle data (`"Low"`, `"Medium"`, `"High"`)
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Low" => Some(CabinOverheatProtectionTemp::Low),
            "Medium" => Some(CabinOverheatProtectionTemp::Medium),
            "High" => Some(CabinOverheatProtectionTemp::High),
            _ => None,
        }
    }
}

/// Model S and X built before 2021 keep the car awake while polled
pub(crate) fn is_pre2021(vin: &str) -> bool {
    let chars: Vec<char> = vin.chars().collect();
    match (chars.get(3), chars.get(9)) {
        (Some(model), Some(year)) => {
            matches!(model, 'S' | 'X') && year.is_ascii_uppercase() && *year <= 'L'
        }
        _ => false,
    }
}
