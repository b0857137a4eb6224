use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::sensor::section_timestamp;
use super::site::{EnergyEntity, EnergyEntityBase, EnergyEntityKind, SiteSource};
use super::{EntityCommand, EntityState, Platform};
use crate::api::{EnergyCommand, Scope, Seat, VehicleCommand};
use crate::error::Result;
use crate::helpers::{auto_type, is_truthy};
use async_trait::async_trait;
use serde_json::Value;

pub type VehicleSwitchEntity = VehicleEntity<VehicleSwitch>;
pub type EnergySwitchEntity = EnergyEntity<EnergySwitch>;

/// A vehicle toggle and the command that sets it
#[derive(Debug, Clone, Copy)]
pub struct VehicleSwitchDescription {
    pub key: &'static str,
    pub streaming_key: Option<&'static str>,
    /// Read when `key` is missing or null
    pub fallback_key: Option<&'static str>,
    /// Any one of these allows the commands
    pub scopes: &'static [Scope],
    pub command: fn(bool) -> VehicleCommand,
}

impl VehicleSwitchDescription {
    const fn new(key: &'static str, command: fn(bool) -> VehicleCommand) -> Self {
        Self {
            key,
            streaming_key: None,
            fallback_key: None,
            scopes: &[Scope::VehicleCmds],
            command,
        }
    }

    const fn streamed(mut self, streaming_key: &'static str) -> Self {
        self.streaming_key = Some(streaming_key);
        self
    }
}

fn sentry_mode(on: bool) -> VehicleCommand {
    VehicleCommand::SetSentryMode { on }
}

fn valet_mode(on: bool) -> VehicleCommand {
    VehicleCommand::SetValetMode { on }
}

fn auto_seat_left(on: bool) -> VehicleCommand {
    VehicleCommand::RemoteAutoSeatClimateRequest {
        seat: Seat::FrontLeft,
        on,
    }
}

fn auto_seat_right(on: bool) -> VehicleCommand {
    VehicleCommand::RemoteAutoSeatClimateRequest {
        seat: Seat::FrontRight,
        on,
    }
}

fn auto_steering_wheel_heat(on: bool) -> VehicleCommand {
    VehicleCommand::RemoteAutoSteeringWheelHeatClimateRequest { on }
}

fn defrost(on: bool) -> VehicleCommand {
    VehicleCommand::SetPreconditioningMax {
        on,
        manual_override: false,
    }
}

fn charge(on: bool) -> VehicleCommand {
    if on {
        VehicleCommand::ChargeStart
    } else {
        VehicleCommand::ChargeStop
    }
}

pub static VEHICLE_SWITCHES: &[VehicleSwitchDescription] = &[
    VehicleSwitchDescription::new("vehicle_state_sentry_mode", sentry_mode).streamed("SentryMode"),
    VehicleSwitchDescription::new("vehicle_state_valet_mode", valet_mode),
    VehicleSwitchDescription::new("climate_state_auto_seat_climate_left", auto_seat_left)
        .streamed("AutoSeatClimateLeft"),
    VehicleSwitchDescription::new("climate_state_auto_seat_climate_right", auto_seat_right)
        .streamed("AutoSeatClimateRight"),
    VehicleSwitchDescription::new(
        "climate_state_auto_steering_wheel_heat",
        auto_steering_wheel_heat,
    ),
    VehicleSwitchDescription::new("climate_state_defrost_mode", defrost),
    VehicleSwitchDescription {
        fallback_key: Some("charge_state_charge_enable_request"),
        scopes: &[Scope::VehicleCmds, Scope::VehicleChargingCmds],
        ..VehicleSwitchDescription::new("charge_state_user_charge_enable_request", charge)
            .streamed("ChargeEnableRequest")
    },
];

fn on_off(is_on: Option<bool>) -> Option<String> {
    is_on.map(|on| if on { "on" } else { "off" }.to_string())
}

/// Restored switch position; anything but on/off is ignored
fn restored(saved: &EntityState) -> Option<bool> {
    match saved.state.as_deref() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

/// A vehicle switch driven by a [`VehicleSwitchDescription`]
#[derive(Debug, Clone)]
pub struct VehicleSwitch {
    description: &'static VehicleSwitchDescription,
    is_on: Option<bool>,
}

impl VehicleSwitch {
    pub fn new(description: &'static VehicleSwitchDescription) -> Self {
        Self {
            description,
            is_on: None,
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }
}

#[async_trait]
impl VehicleEntityKind for VehicleSwitch {
    fn platform(&self) -> Platform {
        Platform::Switch
    }

    fn key(&self) -> &str {
        self.description.key
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        section_timestamp(self.description.key)
    }

    fn streaming_key(&self) -> Option<&'static str> {
        self.description.streaming_key
    }

    fn required_scopes(&self) -> &'static [Scope] {
        self.description.scopes
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        let value = base
            .value()
            .filter(|v| !v.is_null())
            .or_else(|| self.description.fallback_key.and_then(|key| base.get(key)))
            .filter(|v| !v.is_null());
        self.is_on = value.map(|v| is_truthy(Some(&v)));
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.is_on = match value {
            Value::Null => None,
            Value::String(s) => Some(auto_type(s) == Value::Bool(true)),
            other => Some(is_truthy(Some(other))),
        };
    }

    async fn apply_command(
        &mut self,
        base: &VehicleEntityBase,
        command: EntityCommand,
    ) -> Result<()> {
        let on = match command {
            EntityCommand::TurnOn => true,
            EntityCommand::TurnOff => false,
            other => return Err(other.unsupported()),
        };
        base.send((self.description.command)(on)).await?;
        self.is_on = Some(on);
        Ok(())
    }

    fn value(&self) -> EntityState {
        EntityState::new(on_off(self.is_on))
    }

    fn restore(&mut self, base: &VehicleEntityBase, saved: &EntityState) {
        if base.updated_once() {
            return;
        }
        if let Some(on) = restored(saved) {
            self.is_on = Some(on);
        }
    }
}

/// An energy site toggle and the command that sets it
#[derive(Debug, Clone, Copy)]
pub struct EnergySwitchDescription {
    pub key: &'static str,
    pub source: SiteSource,
    /// The field holds the opposite of the switch position; missing counts as false
    pub inverted: bool,
    pub command: fn(bool) -> EnergyCommand,
}

fn storm_mode(enabled: bool) -> EnergyCommand {
    EnergyCommand::StormMode { enabled }
}

fn charge_from_grid(on: bool) -> EnergyCommand {
    EnergyCommand::GridImportExport {
        disallow_charge_from_grid_with_solar_installed: Some(!on),
        customer_preferred_export_rule: None,
    }
}

/// Created for sites whose info reports `components_storm_mode_capable`
pub static STORM_MODE_SWITCH: EnergySwitchDescription = EnergySwitchDescription {
    key: "user_settings_storm_mode_enabled",
    source: SiteSource::Live,
    inverted: false,
    command: storm_mode,
};

/// Created for sites with both battery and solar
pub static CHARGE_FROM_GRID_SWITCH: EnergySwitchDescription = EnergySwitchDescription {
    key: "components_disallow_charge_from_grid_with_solar_installed",
    source: SiteSource::Info,
    inverted: true,
    command: charge_from_grid,
};

#[derive(Debug, Clone)]
pub struct EnergySwitch {
    description: &'static EnergySwitchDescription,
    is_on: Option<bool>,
}

impl EnergySwitch {
    pub fn new(description: &'static EnergySwitchDescription) -> Self {
        Self {
            description,
            is_on: None,
        }
    }
}

#[async_trait]
impl EnergyEntityKind for EnergySwitch {
    fn platform(&self) -> Platform {
        Platform::Switch
    }

    fn key(&self) -> &'static str {
        self.description.key
    }

    fn source(&self) -> SiteSource {
        self.description.source
    }

    fn read(&mut self, base: &EnergyEntityBase) {
        let value = base.value();
        self.is_on = if self.description.inverted {
            Some(!is_truthy(value.as_ref()))
        } else {
            value.filter(|v| !v.is_null()).map(|v| is_truthy(Some(&v)))
        };
    }

    async fn apply_command(
        &mut self,
        base: &EnergyEntityBase,
        command: EntityCommand,
    ) -> Result<()> {
        let on = match command {
            EntityCommand::TurnOn => true,
            EntityCommand::TurnOff => false,
            other => return Err(other.unsupported()),
        };
        base.send((self.description.command)(on)).await?;
        self.is_on = Some(on);
        Ok(())
    }

    fn value(&self) -> EntityState {
        EntityState::new(on_off(self.is_on))
    }
}
