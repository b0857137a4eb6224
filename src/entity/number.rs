use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::sensor::section_timestamp;
use super::site::{EnergyEntity, EnergyEntityBase, EnergyEntityKind, SiteSource};
use super::{EntityCommand, EntityState, Platform, as_f64, number_or_null};
use crate::api::{EnergyCommand, Scope, VehicleCommand};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde_json::Value;

pub type VehicleNumberEntity = VehicleEntity<VehicleNumber>;
pub type EnergyNumberEntity = EnergyEntity<EnergyNumber>;

const KPH_PER_MPH: f64 = 1.609344;

/// A vehicle setting with a numeric range
#[derive(Debug, Clone, Copy)]
pub struct VehicleNumberDescription {
    pub key: &'static str,
    pub streaming_key: Option<&'static str>,
    /// Field holding the value when it differs from `key`
    pub read_key: Option<&'static str>,
    pub min: f64,
    pub max: f64,
    /// Fields that narrow the range, in the stored unit
    pub min_key: Option<&'static str>,
    pub max_key: Option<&'static str>,
    pub unit: &'static str,
    /// Shown value per stored unit
    pub scale: f64,
    /// Whole numbers only
    pub whole: bool,
    pub scopes: &'static [Scope],
    /// Builds the command from a value in the stored unit
    pub command: fn(f64) -> VehicleCommand,
}

impl VehicleNumberDescription {
    const fn new(
        key: &'static str,
        min: f64,
        max: f64,
        unit: &'static str,
        command: fn(f64) -> VehicleCommand,
    ) -> Self {
        Self {
            key,
            streaming_key: None,
            read_key: None,
            min,
            max,
            min_key: None,
            max_key: None,
            unit,
            scale: 1.0,
            whole: true,
            scopes: &[Scope::VehicleCmds],
            command,
        }
    }
}

fn charging_amps(value: f64) -> VehicleCommand {
    VehicleCommand::SetChargingAmps {
        charging_amps: value as u32,
    }
}

fn charge_limit(value: f64) -> VehicleCommand {
    VehicleCommand::SetChargeLimit {
        percent: value as u32,
    }
}

fn speed_limit(value: f64) -> VehicleCommand {
    VehicleCommand::SpeedLimitSetLimit {
        limit_mph: round_to(value, 4),
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub static VEHICLE_NUMBERS: &[VehicleNumberDescription] = &[
    VehicleNumberDescription {
        streaming_key: Some("ChargeCurrentRequest"),
        max_key: Some("charge_state_charge_current_request_max"),
        scopes: &[Scope::VehicleChargingCmds],
        ..VehicleNumberDescription::new("charge_state_charge_current_request", 0.0, 32.0, "A", charging_amps)
    },
    VehicleNumberDescription {
        streaming_key: Some("ChargeLimitSoc"),
        min_key: Some("charge_state_charge_limit_soc_min"),
        max_key: Some("charge_state_charge_limit_soc_max"),
        scopes: &[Scope::VehicleChargingCmds, Scope::VehicleCmds],
        ..VehicleNumberDescription::new("charge_state_charge_limit_soc", 50.0, 100.0, "%", charge_limit)
    },
    VehicleNumberDescription {
        min_key: Some("vehicle_state_speed_limit_mode_min_limit_mph"),
        max_key: Some("vehicle_state_speed_limit_mode_max_limit_mph"),
        whole: false,
        ..VehicleNumberDescription::new(
            "vehicle_state_speed_limit_mode_current_limit_mph",
            50.0,
            120.0,
            "mph",
            speed_limit,
        )
    },
    VehicleNumberDescription {
        read_key: Some("vehicle_state_speed_limit_mode_current_limit_mph"),
        min_key: Some("vehicle_state_speed_limit_mode_min_limit_mph"),
        max_key: Some("vehicle_state_speed_limit_mode_max_limit_mph"),
        scale: KPH_PER_MPH,
        whole: false,
        ..VehicleNumberDescription::new(
            "vehicle_state_speed_limit_mode_current_limit_kph",
            50.0,
            120.0,
            "km/h",
            speed_limit,
        )
    },
];

/// Numeric state text, without a fraction for whole numbers
fn number_state(value: Option<f64>, whole: bool) -> Option<String> {
    let value = value?;
    if whole && value.fract() == 0.0 {
        Some(format!("{}", value as i64))
    } else {
        Some(value.to_string())
    }
}

fn check_range(value: f64, min: f64, max: f64) -> Result<()> {
    if value < min || value > max {
        return Err(BridgeError::validation(
            "value".to_string(),
            format!("{} is outside {} to {}", value, min, max),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct VehicleNumber {
    description: &'static VehicleNumberDescription,
    value: Option<f64>,
    min: f64,
    max: f64,
}

impl VehicleNumber {
    pub fn new(description: &'static VehicleNumberDescription) -> Self {
        Self {
            description,
            value: None,
            min: round_to(description.min * description.scale, 1),
            max: round_to(description.max * description.scale, 1),
        }
    }

    pub fn native_value(&self) -> Option<f64> {
        self.value
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Stored unit to shown unit
    fn shown(&self, stored: f64) -> f64 {
        if self.description.scale == 1.0 {
            stored
        } else {
            round_to(stored * self.description.scale, 1)
        }
    }
}

#[async_trait]
impl VehicleEntityKind for VehicleNumber {
    fn platform(&self) -> Platform {
        Platform::Number
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
        let desc = self.description;
        let read_key = desc.read_key.unwrap_or(desc.key);
        self.value = base.get_f64(read_key).map(|v| self.shown(v));
        let min = desc.min_key.and_then(|k| base.get_f64(k)).unwrap_or(desc.min);
        let max = desc.max_key.and_then(|k| base.get_f64(k)).unwrap_or(desc.max);
        self.min = self.shown(min);
        self.max = self.shown(max);
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.value = as_f64(value).map(|v| self.shown(v));
    }

    async fn apply_command(
        &mut self,
        base: &VehicleEntityBase,
        command: EntityCommand,
    ) -> Result<()> {
        let EntityCommand::SetValue(value) = command else {
            return Err(command.unsupported());
        };
        let value = if self.description.whole {
            value.trunc()
        } else {
            value
        };
        check_range(value, self.min, self.max)?;
        let stored = value / self.description.scale;
        base.send((self.description.command)(stored)).await?;
        self.value = Some(value);
        Ok(())
    }

    fn value(&self) -> EntityState {
        EntityState::new(number_state(self.value, self.description.whole))
            .with_attribute("min", number_or_null(Some(self.min)))
            .with_attribute("max", number_or_null(Some(self.max)))
            .with_attribute("unit_of_measurement", self.description.unit)
    }

    fn restore(&mut self, base: &VehicleEntityBase, saved: &EntityState) {
        if base.updated_once() || self.description.streaming_key.is_none() {
            return;
        }
        if let Some(value) = saved.state.as_deref().and_then(|s| s.parse::<f64>().ok()) {
            self.value = Some(value);
        }
    }
}

/// A site percentage setting
#[derive(Debug, Clone, Copy)]
pub struct EnergyNumberDescription {
    pub key: &'static str,
    /// Site info flag the site must report for this entity to exist
    pub requires: &'static str,
    pub command: fn(u32) -> EnergyCommand,
}

fn backup_reserve(percent: u32) -> EnergyCommand {
    EnergyCommand::Backup {
        backup_reserve_percent: percent,
    }
}

fn off_grid_reserve(percent: u32) -> EnergyCommand {
    EnergyCommand::OffGridVehicleChargingReserve { percent }
}

pub static ENERGY_NUMBERS: &[EnergyNumberDescription] = &[
    EnergyNumberDescription {
        key: "backup_reserve_percent",
        requires: "components_battery",
        command: backup_reserve,
    },
    EnergyNumberDescription {
        key: "off_grid_vehicle_charging_reserve_percent",
        requires: "components_off_grid_vehicle_charging_reserve_supported",
        command: off_grid_reserve,
    },
];

#[derive(Debug, Clone)]
pub struct EnergyNumber {
    description: &'static EnergyNumberDescription,
    value: Option<f64>,
}

impl EnergyNumber {
    pub fn new(description: &'static EnergyNumberDescription) -> Self {
        Self {
            description,
            value: None,
        }
    }
}

#[async_trait]
impl EnergyEntityKind for EnergyNumber {
    fn platform(&self) -> Platform {
        Platform::Number
    }

    fn key(&self) -> &'static str {
        self.description.key
    }

    fn source(&self) -> SiteSource {
        SiteSource::Info
    }

    fn read(&mut self, base: &EnergyEntityBase) {
        self.value = base.value().as_ref().and_then(as_f64);
    }

    async fn apply_command(
        &mut self,
        base: &EnergyEntityBase,
        command: EntityCommand,
    ) -> Result<()> {
        let EntityCommand::SetValue(value) = command else {
            return Err(command.unsupported());
        };
        let value = value.trunc();
        check_range(value, 0.0, 100.0)?;
        base.send((self.description.command)(value as u32)).await?;
        self.value = Some(value);
        Ok(())
    }

    fn value(&self) -> EntityState {
        EntityState::new(number_state(self.value, true))
            .with_attribute("min", 0)
            .with_attribute("max", 100)
            .with_attribute("unit_of_measurement", "%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(key: &str) -> &'static VehicleNumberDescription {
        VEHICLE_NUMBERS.iter().find(|d| d.key == key).unwrap()
    }

    #[test]
    fn test_number_state_text() {
        assert_eq!(number_state(Some(16.0), true).as_deref(), Some("16"));
        assert_eq!(number_state(Some(104.6), false).as_deref(), Some("104.6"));
        assert_eq!(number_state(None, true), None);
    }

    #[test]
    fn test_metric_speed_limit_converts() {
        let mut number = VehicleNumber::new(description("vehicle_state_speed_limit_mode_current_limit_kph"));
        assert_eq!(number.range(), (80.5, 193.1));
        number.read_from_stream(&Value::from(65));
        assert_eq!(number.native_value(), Some(104.6));
        assert_eq!(
            (number.description.command)(100.0 / KPH_PER_MPH),
            VehicleCommand::SpeedLimitSetLimit { limit_mph: 62.1371 }
        );
    }

    #[test]
    fn test_range_check() {
        assert!(check_range(50.0, 50.0, 100.0).is_ok());
        let err = check_range(101.0, 50.0, 100.0).unwrap_err();
        assert!(err.to_string().contains("101 is outside 50 to 100"));
    }
}
