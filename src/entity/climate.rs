use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::{EntityCommand, EntityState, HvacMode, Platform, as_f64, number_or_null};
use crate::api::{CabinOverheatProtectionTemp, VehicleCommand};
use crate::error::{BridgeError, Result};
use crate::helpers::is_truthy;
use async_trait::async_trait;
use serde_json::{Value, json};

pub const PRESET_MODES: [&str; 4] = ["off", "keep", "dog", "camp"];
pub const FAN_MODES: [&str; 2] = ["off", "bioweapon"];

const DEFAULT_MIN_TEMP: f64 = 15.0;
const DEFAULT_MAX_TEMP: f64 = 28.0;

const CLIMATE_TIMESTAMP: &str = "climate_state_timestamp";
const INSIDE_TEMP: &str = "InsideTemp";

/// Driver-side cabin climate
pub type ClimateEntity = VehicleEntity<Climate>;

/// Cabin overheat protection
pub type CabinOverheatProtectionEntity = VehicleEntity<CabinOverheatProtection>;

#[derive(Debug, Clone, PartialEq)]
pub struct Climate {
    hvac_mode: Option<HvacMode>,
    current_temperature: Option<f64>,
    target_temperature: Option<f64>,
    preset_mode: Option<String>,
    fan_mode: Option<String>,
    min_temp: f64,
    max_temp: f64,
    supported_features: Vec<&'static str>,
}

impl Default for Climate {
    fn default() -> Self {
        Self {
            hvac_mode: None,
            current_temperature: None,
            target_temperature: None,
            preset_mode: None,
            fan_mode: None,
            min_temp: DEFAULT_MIN_TEMP,
            max_temp: DEFAULT_MAX_TEMP,
            supported_features: Vec::new(),
        }
    }
}

impl Climate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.hvac_mode
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.target_temperature
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.current_temperature
    }

    pub fn preset_mode(&self) -> Option<&str> {
        self.preset_mode.as_deref()
    }

    pub fn fan_mode(&self) -> Option<&str> {
        self.fan_mode.as_deref()
    }

    async fn turn_on(&mut self, base: &VehicleEntityBase) -> Result<()> {
        base.send(VehicleCommand::AutoConditioningStart).await?;
        self.hvac_mode = Some(HvacMode::HeatCool);
        Ok(())
    }

    async fn turn_off(&mut self, base: &VehicleEntityBase) -> Result<()> {
        base.send(VehicleCommand::AutoConditioningStop).await?;
        self.hvac_mode = Some(HvacMode::Off);
        self.preset_mode = Some(PRESET_MODES[0].to_string());
        self.fan_mode = Some(FAN_MODES[0].to_string());
        Ok(())
    }

    async fn set_hvac_mode(&mut self, base: &VehicleEntityBase, mode: HvacMode) -> Result<()> {
        match mode {
            HvacMode::Off => self.turn_off(base).await,
            _ => self.turn_on(base).await,
        }
    }
}

#[async_trait]
impl VehicleEntityKind for Climate {
    fn platform(&self) -> Platform {
        Platform::Climate
    }

    fn key(&self) -> &str {
        "driver_temp"
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        Some(CLIMATE_TIMESTAMP)
    }

    fn streaming_key(&self) -> Option<&'static str> {
        Some(INSIDE_TEMP)
    }

    fn attach(&mut self, base: &VehicleEntityBase) {
        if base.scoped() {
            self.supported_features = vec![
                "turn_on",
                "turn_off",
                "target_temperature",
                "preset_mode",
                "fan_mode",
            ];
        }
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        let climate_on = base.get("climate_state_is_climate_on");
        self.hvac_mode = Some(if is_truthy(climate_on.as_ref()) {
            HvacMode::HeatCool
        } else {
            HvacMode::Off
        });

        self.current_temperature = base.get_f64("climate_state_inside_temp");
        self.target_temperature = base.get_f64(&format!("climate_state_{}_setting", base.key()));
        self.preset_mode = base
            .get("climate_state_climate_keeper_mode")
            .and_then(|v| v.as_str().map(str::to_string));
        let bioweapon = base.get("climate_state_bioweapon_mode");
        self.fan_mode = Some(if is_truthy(bioweapon.as_ref()) {
            FAN_MODES[1].to_string()
        } else {
            FAN_MODES[0].to_string()
        });
        self.min_temp = base
            .get_f64("climate_state_min_avail_temp")
            .unwrap_or(DEFAULT_MIN_TEMP);
        self.max_temp = base
            .get_f64("climate_state_max_avail_temp")
            .unwrap_or(DEFAULT_MAX_TEMP);
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.current_temperature = as_f64(value);
    }

    async fn apply_command(&mut self, base: &VehicleEntityBase, command: EntityCommand) -> Result<()> {
        match command {
            EntityCommand::TurnOn => self.turn_on(base).await,
            EntityCommand::TurnOff => self.turn_off(base).await,
            EntityCommand::SetHvacMode(mode) => self.set_hvac_mode(base, mode).await,
            EntityCommand::SetTemperature {
                temperature,
                hvac_mode,
            } => {
                if let Some(temp) = temperature {
                    base.send(VehicleCommand::SetTemps {
                        driver_temp: temp,
                        passenger_temp: temp,
                    })
                    .await?;
                    self.target_temperature = Some(temp);
                }
                match hvac_mode {
                    Some(mode) => self.set_hvac_mode(base, mode).await,
                    None => Ok(()),
                }
            }
            EntityCommand::SetPresetMode(preset) => {
                let Some(index) = PRESET_MODES.iter().position(|p| *p == preset) else {
                    return Err(BridgeError::validation(
                        "preset_mode".to_string(),
                        format!("Unknown preset mode {}", preset),
                    ));
                };
                base.send(VehicleCommand::SetClimateKeeperMode {
                    climate_keeper_mode: index as u8,
                })
                .await?;
                self.hvac_mode = Some(if index == 0 {
                    HvacMode::Off
                } else {
                    HvacMode::HeatCool
                });
                self.preset_mode = Some(preset);
                Ok(())
            }
            EntityCommand::SetFanMode(fan) => {
                if !FAN_MODES.contains(&fan.as_str()) {
                    return Err(BridgeError::validation(
                        "fan_mode".to_string(),
                        format!("Unknown fan mode {}", fan),
                    ));
                }
                base.send(VehicleCommand::SetBioweaponMode {
                    on: fan != FAN_MODES[0],
                    manual_override: true,
                })
                .await?;
                if fan == FAN_MODES[1] {
                    self.hvac_mode = Some(HvacMode::HeatCool);
                }
                self.fan_mode = Some(fan);
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }

    fn value(&self) -> EntityState {
        EntityState::new(self.hvac_mode.map(|m| m.as_str().to_string()))
            .with_attribute("current_temperature", number_or_null(self.current_temperature))
            .with_attribute("temperature", number_or_null(self.target_temperature))
            .with_attribute("preset_mode", self.preset_mode.clone())
            .with_attribute("fan_mode", self.fan_mode.clone())
            .with_attribute("min_temp", self.min_temp)
            .with_attribute("max_temp", self.max_temp)
            .with_attribute("hvac_modes", json!(["heat_cool", "off"]))
            .with_attribute("preset_modes", json!(PRESET_MODES))
            .with_attribute("fan_modes", json!(FAN_MODES))
            .with_attribute("supported_features", json!(self.supported_features))
    }

    /// Temperatures survive a restart until the first full poll
    fn restore(&mut self, base: &VehicleEntityBase, saved: &EntityState) {
        if base.updated_once() {
            return;
        }
        self.current_temperature = saved.attribute("current_temperature").and_then(as_f64);
        self.target_temperature = saved.attribute("temperature").and_then(as_f64);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CabinOverheatProtection {
    hvac_mode: Option<HvacMode>,
    current_temperature: Option<f64>,
    target_temperature: Option<f64>,
    supported_features: Vec<&'static str>,
}

impl CabinOverheatProtection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.hvac_mode
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.target_temperature
    }

    pub fn supported_features(&self) -> &[&'static str] {
        &self.supported_features
    }

    async fn set_hvac_mode(&mut self, base: &VehicleEntityBase, mode: HvacMode) -> Result<()> {
        let (on, fan_only) = match mode {
            HvacMode::Off => (false, false),
            HvacMode::Cool => (true, false),
            HvacMode::FanOnly => (true, true),
            HvacMode::HeatCool => {
                return Err(BridgeError::validation(
                    "hvac_mode".to_string(),
                    format!("Unsupported HVAC mode {}", mode),
                ));
            }
        };
        base.send(VehicleCommand::SetCabinOverheatProtection { on, fan_only })
            .await?;
        self.hvac_mode = Some(mode);
        Ok(())
    }
}

fn cop_mode(value: &str) -> Option<HvacMode> {
    match value {
        "Off" => Some(HvacMode::Off),
        "On" => Some(HvacMode::Cool),
        "FanOnly" => Some(HvacMode::FanOnly),
        _ => None,
    }
}

#[async_trait]
impl VehicleEntityKind for CabinOverheatProtection {
    fn platform(&self) -> Platform {
        Platform::Climate
    }

    fn key(&self) -> &str {
        "climate_state_cabin_overheat_protection"
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        Some(CLIMATE_TIMESTAMP)
    }

    fn streaming_key(&self) -> Option<&'static str> {
        Some(INSIDE_TEMP)
    }

    fn attach(&mut self, base: &VehicleEntityBase) {
        self.supported_features = if !base.scoped() {
            Vec::new()
        } else if is_truthy(base.get("vehicle_config_cop_user_set_temp_supported").as_ref()) {
            vec!["target_temperature"]
        } else {
            vec!["turn_on", "turn_off"]
        };
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        self.hvac_mode = base
            .value()
            .as_ref()
            .and_then(Value::as_str)
            .and_then(cop_mode);
        self.target_temperature = base
            .get("climate_state_cop_activation_temperature")
            .as_ref()
            .and_then(Value::as_str)
            .and_then(CabinOverheatProtectionTemp::from_label)
            .map(|level| level.celsius());
        self.current_temperature = base.get_f64("climate_state_inside_temp");
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.current_temperature = as_f64(value);
    }

    async fn apply_command(&mut self, base: &VehicleEntityBase, command: EntityCommand) -> Result<()> {
        match command {
            EntityCommand::TurnOn => self.set_hvac_mode(base, HvacMode::Cool).await,
            EntityCommand::TurnOff => self.set_hvac_mode(base, HvacMode::Off).await,
            EntityCommand::SetHvacMode(mode) => self.set_hvac_mode(base, mode).await,
            EntityCommand::SetTemperature {
                temperature,
                hvac_mode,
            } => {
                if let Some(temp) = temperature {
                    let level = CabinOverheatProtectionTemp::from_celsius(temp).ok_or_else(|| {
                        BridgeError::validation("temperature", "Invalid temperature")
                    })?;
                    base.send(VehicleCommand::SetCopTemp {
                        cop_temp: level.index(),
                    })
                    .await?;
                    self.target_temperature = Some(level.celsius());
                }
                match hvac_mode {
                    Some(mode) => self.set_hvac_mode(base, mode).await,
                    None => Ok(()),
                }
            }
            other => Err(other.unsupported()),
        }
    }

    fn value(&self) -> EntityState {
        EntityState::new(self.hvac_mode.map(|m| m.as_str().to_string()))
            .with_attribute("current_temperature", number_or_null(self.current_temperature))
            .with_attribute("temperature", number_or_null(self.target_temperature))
            .with_attribute("min_temp", 30.0)
            .with_attribute("max_temp", 40.0)
            .with_attribute("target_temp_step", 5.0)
            .with_attribute("hvac_modes", json!(["off", "cool", "fan_only"]))
            .with_attribute("supported_features", json!(self.supported_features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cop_modes() {
        assert_eq!(cop_mode("On"), Some(HvacMode::Cool));
        assert_eq!(cop_mode("FanOnly"), Some(HvacMode::FanOnly));
        assert_eq!(cop_mode("Off"), Some(HvacMode::Off));
        assert_eq!(cop_mode("Unknown"), None);
    }

    #[test]
    fn test_climate_value_attributes() {
        let climate = Climate {
            hvac_mode: Some(HvacMode::HeatCool),
            target_temperature: Some(21.5),
            ..Climate::default()
        };
        let state = climate.value();
        assert_eq!(state.state.as_deref(), Some("heat_cool"));
        assert_eq!(state.attribute("temperature"), Some(&json!(21.5)));
        assert_eq!(state.attribute("current_temperature"), Some(&Value::Null));
        assert_eq!(state.attribute("min_temp"), Some(&json!(15.0)));
    }

    #[test]
    fn test_unset_modes_have_no_state() {
        assert_eq!(CabinOverheatProtection::new().value().state, None);
        assert_eq!(Climate::new().value().state, None);
    }
}
