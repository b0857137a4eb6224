use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::site::{EnergyEntity, EnergyEntityBase, EnergyEntityKind, SiteSource};
use super::{EntityState, Platform, as_f64};
use crate::helpers::{auto_type, is_truthy};
use async_trait::async_trait;
use serde_json::Value;

pub type VehicleBinarySensorEntity = VehicleEntity<VehicleBinarySensor>;
pub type EnergyBinarySensorEntity = EnergyEntity<EnergyBinarySensor>;

/// How a vehicle binary sensor reads its value
#[derive(Debug, Clone, Copy)]
pub struct VehicleBinarySensorDescription {
    pub key: &'static str,
    pub streaming_key: Option<&'static str>,
    /// False for fields only the stream carries
    pub polled: bool,
    pub is_on: fn(&Value) -> bool,
    pub stream_is_on: fn(&Value) -> bool,
}

impl VehicleBinarySensorDescription {
    const fn new(key: &'static str) -> Self {
        Self {
            key,
            streaming_key: None,
            polled: true,
            is_on: truthy,
            stream_is_on: stream_truthy,
        }
    }

    const fn streamed(mut self, streaming_key: &'static str) -> Self {
        self.streaming_key = Some(streaming_key);
        self
    }

    const fn stream_only(mut self, streaming_key: &'static str) -> Self {
        self.streaming_key = Some(streaming_key);
        self.polled = false;
        self
    }
}

fn truthy(value: &Value) -> bool {
    is_truthy(Some(value))
}

fn stream_truthy(value: &Value) -> bool {
    match value {
        Value::String(s) => truthy(&auto_type(s)),
        other => truthy(other),
    }
}

fn multi_phase(value: &Value) -> bool {
    as_f64(value).is_some_and(|phases| phases > 1.0)
}

fn cable_connected(value: &Value) -> bool {
    value.as_str() != Some("<invalid>")
}

fn dashcam_recording(value: &Value) -> bool {
    value.as_str() == Some("Recording")
}

/// Polled windows report 0 or 1, streamed ones a state name
fn window_open(value: &Value) -> bool {
    match value.as_str() {
        Some("WindowStateClosed") => false,
        Some(s) if s.starts_with("WindowState") => true,
        _ => stream_truthy(value),
    }
}

pub static VEHICLE_BINARY_SENSORS: &[VehicleBinarySensorDescription] = &[
    VehicleBinarySensorDescription::new("charge_state_battery_heater_on").streamed("BatteryHeaterOn"),
    VehicleBinarySensorDescription {
        is_on: multi_phase,
        stream_is_on: multi_phase,
        ..VehicleBinarySensorDescription::new("charge_state_charger_phases").streamed("ChargerPhases")
    },
    VehicleBinarySensorDescription::new("charge_state_preconditioning_enabled")
        .streamed("PreconditioningEnabled"),
    VehicleBinarySensorDescription::new("climate_state_is_preconditioning"),
    VehicleBinarySensorDescription::new("charge_state_scheduled_charging_pending")
        .streamed("ScheduledChargingPending"),
    VehicleBinarySensorDescription::new("charge_state_trip_charging"),
    VehicleBinarySensorDescription {
        is_on: cable_connected,
        ..VehicleBinarySensorDescription::new("charge_state_conn_charge_cable")
    },
    VehicleBinarySensorDescription::new("climate_state_cabin_overheat_protection_actively_cooling"),
    VehicleBinarySensorDescription {
        is_on: dashcam_recording,
        ..VehicleBinarySensorDescription::new("vehicle_state_dashcam_state")
    },
    VehicleBinarySensorDescription::new("vehicle_state_is_user_present"),
    VehicleBinarySensorDescription::new("vehicle_state_tpms_soft_warning_fl"),
    VehicleBinarySensorDescription::new("vehicle_state_tpms_soft_warning_fr"),
    VehicleBinarySensorDescription::new("vehicle_state_tpms_soft_warning_rl"),
    VehicleBinarySensorDescription::new("vehicle_state_tpms_soft_warning_rr"),
    VehicleBinarySensorDescription {
        stream_is_on: window_open,
        ..VehicleBinarySensorDescription::new("vehicle_state_fd_window").streamed("FdWindow")
    },
    VehicleBinarySensorDescription {
        stream_is_on: window_open,
        ..VehicleBinarySensorDescription::new("vehicle_state_fp_window").streamed("FpWindow")
    },
    VehicleBinarySensorDescription {
        stream_is_on: window_open,
        ..VehicleBinarySensorDescription::new("vehicle_state_rd_window").streamed("RdWindow")
    },
    VehicleBinarySensorDescription {
        stream_is_on: window_open,
        ..VehicleBinarySensorDescription::new("vehicle_state_rp_window").streamed("RpWindow")
    },
    VehicleBinarySensorDescription::new("vehicle_state_df"),
    VehicleBinarySensorDescription::new("vehicle_state_dr"),
    VehicleBinarySensorDescription::new("vehicle_state_pf"),
    VehicleBinarySensorDescription::new("vehicle_state_pr"),
    VehicleBinarySensorDescription::new("automatic_blind_spot_camera")
        .stream_only("AutomaticBlindSpotCamera"),
    VehicleBinarySensorDescription::new("automatic_emergency_braking_off")
        .stream_only("AutomaticEmergencyBrakingOff"),
    VehicleBinarySensorDescription::new("blind_spot_collision_warning_chime")
        .stream_only("BlindSpotCollisionWarningChime"),
    VehicleBinarySensorDescription::new("bms_full_charge_complete")
        .stream_only("BmsFullchargecomplete"),
    VehicleBinarySensorDescription::new("brake_pedal").stream_only("BrakePedal"),
    VehicleBinarySensorDescription::new("charge_enable_request").stream_only("ChargeEnableRequest"),
    VehicleBinarySensorDescription::new("charge_port_cold_weather_mode")
        .stream_only("ChargePortColdWeatherMode"),
    VehicleBinarySensorDescription::new("service_mode").stream_only("ServiceMode"),
];

fn on_off(is_on: Option<bool>) -> Option<String> {
    is_on.map(|on| if on { "on" } else { "off" }.to_string())
}

/// A vehicle binary sensor driven by a [`VehicleBinarySensorDescription`]
#[derive(Debug, Clone)]
pub struct VehicleBinarySensor {
    description: &'static VehicleBinarySensorDescription,
    is_on: Option<bool>,
    available: bool,
}

impl VehicleBinarySensor {
    pub fn new(description: &'static VehicleBinarySensorDescription) -> Self {
        Self {
            description,
            is_on: None,
            available: !description.polled,
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }
}

#[async_trait]
impl VehicleEntityKind for VehicleBinarySensor {
    fn platform(&self) -> Platform {
        Platform::BinarySensor
    }

    fn key(&self) -> &str {
        self.description.key
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        super::sensor::section_timestamp(self.description.key)
    }

    fn streaming_key(&self) -> Option<&'static str> {
        self.description.streaming_key
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        if !self.description.polled {
            return;
        }
        match base.value() {
            None | Some(Value::Null) => {
                self.available = false;
                self.is_on = None;
            }
            Some(value) => {
                self.available = true;
                self.is_on = Some((self.description.is_on)(&value));
            }
        }
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.available = true;
        self.is_on = if value.is_null() {
            None
        } else {
            Some((self.description.stream_is_on)(value))
        };
    }

    fn value(&self) -> EntityState {
        let mut state = EntityState::new(on_off(self.is_on));
        state.available = self.available;
        state
    }

    fn restore(&mut self, base: &VehicleEntityBase, saved: &EntityState) {
        if base.updated_once() && self.description.polled {
            return;
        }
        if let Some(text) = &saved.state {
            self.is_on = Some(text == "on");
        }
    }
}

/// An energy site flag from live status or site info
#[derive(Debug, Clone, Copy)]
pub struct EnergyBinarySensorDescription {
    pub key: &'static str,
    pub source: SiteSource,
}

pub static ENERGY_BINARY_SENSORS: &[EnergyBinarySensorDescription] = &[
    EnergyBinarySensorDescription {
        key: "backup_capable",
        source: SiteSource::Live,
    },
    EnergyBinarySensorDescription {
        key: "grid_services_active",
        source: SiteSource::Live,
    },
    EnergyBinarySensorDescription {
        key: "storm_mode_active",
        source: SiteSource::Live,
    },
    EnergyBinarySensorDescription {
        key: "components_grid_services_enabled",
        source: SiteSource::Info,
    },
];

#[derive(Debug, Clone)]
pub struct EnergyBinarySensor {
    description: &'static EnergyBinarySensorDescription,
    is_on: Option<bool>,
}

impl EnergyBinarySensor {
    pub fn new(description: &'static EnergyBinarySensorDescription) -> Self {
        Self {
            description,
            is_on: None,
        }
    }
}

#[async_trait]
impl EnergyEntityKind for EnergyBinarySensor {
    fn platform(&self) -> Platform {
        Platform::BinarySensor
    }

    fn key(&self) -> &'static str {
        self.description.key
    }

    fn source(&self) -> SiteSource {
        self.description.source
    }

    fn read(&mut self, base: &EnergyEntityBase) {
        self.is_on = base.value().filter(|v| !v.is_null()).map(|v| truthy(&v));
    }

    fn value(&self) -> EntityState {
        EntityState::new(on_off(self.is_on))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn description(key: &str) -> &'static VehicleBinarySensorDescription {
        VEHICLE_BINARY_SENSORS.iter().find(|d| d.key == key).unwrap()
    }

    #[test]
    fn test_charger_phases_needs_more_than_one() {
        let desc = description("charge_state_charger_phases");
        assert!(!(desc.is_on)(&json!(1)));
        assert!((desc.is_on)(&json!(3)));
        assert!((desc.stream_is_on)(&json!("2")));
    }

    #[test]
    fn test_stream_values_are_typed() {
        let mut sensor = VehicleBinarySensor::new(description("charge_state_battery_heater_on"));
        sensor.read_from_stream(&json!("false"));
        assert_eq!(sensor.value().state.as_deref(), Some("off"));
        sensor.read_from_stream(&json!("true"));
        assert_eq!(sensor.value().state.as_deref(), Some("on"));
        sensor.read_from_stream(&Value::Null);
        assert_eq!(sensor.value().state, None);
    }

    #[test]
    fn test_window_states() {
        assert!(!window_open(&json!("WindowStateClosed")));
        assert!(window_open(&json!("WindowStatePartiallyOpen")));
        assert!(window_open(&json!(1)));
        assert!(!window_open(&json!(0)));
    }

    #[test]
    fn test_polled_value_fns() {
        assert!(!(description("charge_state_conn_charge_cable").is_on)(&json!("<invalid>")));
        assert!((description("charge_state_conn_charge_cable").is_on)(&json!("IEC")));
        assert!((description("vehicle_state_dashcam_state").is_on)(&json!("Recording")));
        assert!(!(description("vehicle_state_dashcam_state").is_on)(&json!("Unavailable")));
    }
}
