use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::{EntityState, Platform};
use crate::helpers::{IgnoreDrop, auto_type};
use async_trait::async_trait;
use serde_json::Value;

pub type VehicleSensorEntity = VehicleEntity<VehicleSensor>;

/// How a vehicle sensor reads and shapes its value
#[derive(Debug, Clone, Copy)]
pub struct VehicleSensorDescription {
    pub key: &'static str,
    pub streaming_key: Option<&'static str>,
    pub unit: Option<&'static str>,
    pub value_fn: fn(&Value) -> Value,
    pub available_fn: fn(Option<&Value>) -> bool,
    pub stream_value_fn: fn(&Value) -> Value,
    /// False for fields only the stream carries
    pub polled: bool,
    /// Hold the previous reading through drops up to this size
    pub ignore_drop: Option<f64>,
}

impl VehicleSensorDescription {
    const fn new(key: &'static str) -> Self {
        Self {
            key,
            streaming_key: None,
            unit: None,
            value_fn: identity,
            available_fn: not_null,
            stream_value_fn: typed,
            polled: true,
            ignore_drop: None,
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

    const fn ignore_drop(mut self, change: f64) -> Self {
        self.ignore_drop = Some(change);
        self
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

fn identity(value: &Value) -> Value {
    value.clone()
}

fn not_null(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !v.is_null())
}

fn always(_: Option<&Value>) -> bool {
    true
}

fn positive(value: Option<&Value>) -> bool {
    value.and_then(super::as_f64).is_some_and(|v| v > 0.0)
}

/// Stream values arrive as strings; give them back their JSON type
fn typed(value: &Value) -> Value {
    match value {
        Value::String(s) => auto_type(s),
        other => other.clone(),
    }
}

fn or_zero(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(false) => Value::from(0),
        other => other.clone(),
    }
}

/// Vehicle charging state in lower-case form
pub fn charge_state(raw: &str) -> Option<&'static str> {
    match raw {
        "Starting" => Some("starting"),
        "Charging" => Some("charging"),
        "Stopped" => Some("stopped"),
        "Complete" => Some("complete"),
        "Disconnected" => Some("disconnected"),
        "NoPower" => Some("no_power"),
        _ => None,
    }
}

fn shift_state(raw: &str) -> Option<&'static str> {
    match raw {
        "P" => Some("p"),
        "D" => Some("d"),
        "R" => Some("r"),
        "N" => Some("n"),
        _ => None,
    }
}

fn charge_state_value(value: &Value) -> Value {
    value
        .as_str()
        .and_then(charge_state)
        .map_or(Value::Null, Value::from)
}

/// A missing gear means parked
fn shift_state_polled(value: &Value) -> Value {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Value::from(shift_state(&raw).unwrap_or("p"))
}

fn shift_state_streamed(value: &Value) -> Value {
    value
        .as_str()
        .and_then(shift_state)
        .map_or(Value::Null, Value::from)
}

/// `SentryModeStateArmed` becomes `armed`
fn sentry_mode_streamed(value: &Value) -> Value {
    value
        .as_str()
        .map(|s| s.trim_start_matches("SentryModeState").to_lowercase())
        .filter(|s| !s.is_empty())
        .map_or(Value::Null, Value::from)
}

pub static VEHICLE_SENSORS: &[VehicleSensorDescription] = &[
    VehicleSensorDescription {
        value_fn: charge_state_value,
        stream_value_fn: charge_state_value,
        ..VehicleSensorDescription::new("charge_state_charging_state").streamed("DetailedChargeState")
    },
    VehicleSensorDescription::new("charge_state_battery_level")
        .streamed("BatteryLevel")
        .unit("%"),
    VehicleSensorDescription::new("charge_state_usable_battery_level").unit("%"),
    VehicleSensorDescription::new("charge_state_charge_energy_added")
        .streamed("ACChargingEnergyIn")
        .unit("kWh"),
    VehicleSensorDescription::new("charge_state_charger_power")
        .streamed("ACChargingPower")
        .unit("kW"),
    VehicleSensorDescription::new("charge_state_charger_voltage").unit("V"),
    VehicleSensorDescription::new("charge_state_charger_actual_current")
        .streamed("ChargeAmps")
        .unit("A"),
    VehicleSensorDescription::new("charge_state_charge_rate").unit("mph"),
    VehicleSensorDescription::new("charge_state_battery_range")
        .unit("mi")
        .ignore_drop(1.0),
    VehicleSensorDescription::new("charge_state_est_battery_range")
        .streamed("EstBatteryRange")
        .unit("mi")
        .ignore_drop(1.0),
    VehicleSensorDescription::new("charge_state_ideal_battery_range")
        .streamed("IdealBatteryRange")
        .unit("mi")
        .ignore_drop(1.0),
    VehicleSensorDescription::new("charge_state_fast_charger_type").streamed("FastChargerType"),
    VehicleSensorDescription::new("charge_state_scheduled_charging_mode"),
    VehicleSensorDescription {
        available_fn: positive,
        ..VehicleSensorDescription::new("charge_state_minutes_to_full_charge")
            .streamed("TimeToFullCharge")
            .unit("min")
    },
    VehicleSensorDescription {
        value_fn: or_zero,
        ..VehicleSensorDescription::new("drive_state_speed")
            .streamed("VehicleSpeed")
            .unit("mph")
    },
    VehicleSensorDescription {
        value_fn: or_zero,
        ..VehicleSensorDescription::new("drive_state_power").unit("kW")
    },
    VehicleSensorDescription {
        value_fn: shift_state_polled,
        available_fn: always,
        stream_value_fn: shift_state_streamed,
        ..VehicleSensorDescription::new("drive_state_shift_state").streamed("Gear")
    },
    VehicleSensorDescription::new("drive_state_active_route_traffic_minutes_delay")
        .streamed("RouteTrafficMinutesDelay")
        .unit("min"),
    VehicleSensorDescription::new("drive_state_active_route_energy_at_arrival")
        .streamed("ExpectedEnergyPercentAtTripArrival")
        .unit("%"),
    VehicleSensorDescription::new("drive_state_active_route_miles_to_arrival")
        .streamed("MilesToArrival")
        .unit("mi"),
    VehicleSensorDescription::new("drive_state_active_route_minutes_to_arrival")
        .streamed("MinutesToArrival")
        .unit("min"),
    VehicleSensorDescription::new("vehicle_state_odometer")
        .streamed("Odometer")
        .unit("mi"),
    VehicleSensorDescription::new("vehicle_state_tpms_pressure_fl")
        .streamed("TpmsPressureFl")
        .unit("bar"),
    VehicleSensorDescription::new("vehicle_state_tpms_pressure_fr")
        .streamed("TpmsPressureFr")
        .unit("bar"),
    VehicleSensorDescription::new("vehicle_state_tpms_pressure_rl")
        .streamed("TpmsPressureRl")
        .unit("bar"),
    VehicleSensorDescription::new("vehicle_state_tpms_pressure_rr")
        .streamed("TpmsPressureRr")
        .unit("bar"),
    VehicleSensorDescription::new("climate_state_inside_temp")
        .streamed("InsideTemp")
        .unit("°C"),
    VehicleSensorDescription::new("climate_state_outside_temp")
        .streamed("OutsideTemp")
        .unit("°C"),
    VehicleSensorDescription::new("climate_state_driver_temp_setting").unit("°C"),
    VehicleSensorDescription::new("climate_state_passenger_temp_setting").unit("°C"),
    VehicleSensorDescription::new("vehicle_config_exterior_color"),
    VehicleSensorDescription::new("vehicle_config_roof_color"),
    VehicleSensorDescription::new("energy_remaining")
        .stream_only("EnergyRemaining")
        .unit("kWh")
        .ignore_drop(0.1),
    VehicleSensorDescription::new("lifetime_energy_used")
        .stream_only("LifetimeEnergyUsed")
        .unit("kWh"),
    VehicleSensorDescription::new("pack_voltage")
        .stream_only("PackVoltage")
        .unit("V"),
    VehicleSensorDescription::new("pack_current")
        .stream_only("PackCurrent")
        .unit("A"),
    VehicleSensorDescription::new("rated_range")
        .stream_only("RatedRange")
        .unit("mi")
        .ignore_drop(1.0),
    VehicleSensorDescription::new("state_of_charge")
        .stream_only("Soc")
        .unit("%"),
    VehicleSensorDescription {
        stream_value_fn: sentry_mode_streamed,
        ..VehicleSensorDescription::new("sentry_mode").stream_only("SentryMode")
    },
];

/// Poll timestamp of the data section a key belongs to
pub(super) fn section_timestamp(key: &str) -> Option<&'static str> {
    [
        ("charge_state_", "charge_state_timestamp"),
        ("climate_state_", "climate_state_timestamp"),
        ("drive_state_", "drive_state_timestamp"),
        ("vehicle_state_", "vehicle_state_timestamp"),
    ]
    .into_iter()
    .find(|(prefix, _)| key.starts_with(prefix))
    .map(|(_, ts)| ts)
}

/// JSON value as entity state text
pub(crate) fn state_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A vehicle sensor driven by a [`VehicleSensorDescription`]
#[derive(Debug, Clone)]
pub struct VehicleSensor {
    description: &'static VehicleSensorDescription,
    native_value: Value,
    available: bool,
    drop_filter: Option<IgnoreDrop>,
}

impl VehicleSensor {
    pub fn new(description: &'static VehicleSensorDescription) -> Self {
        Self {
            description,
            native_value: Value::Null,
            available: false,
            drop_filter: description.ignore_drop.map(IgnoreDrop::new),
        }
    }

    fn filtered(&mut self, value: Value) -> Value {
        match self.drop_filter.as_mut() {
            Some(filter) => filter.filter(value),
            None => value,
        }
    }

    pub fn native_value(&self) -> &Value {
        &self.native_value
    }
}

#[async_trait]
impl VehicleEntityKind for VehicleSensor {
    fn platform(&self) -> Platform {
        Platform::Sensor
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

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        if !self.description.polled {
            return;
        }
        let value = base.value();
        if (self.description.available_fn)(value.as_ref()) {
            self.available = true;
            let shaped = (self.description.value_fn)(value.as_ref().unwrap_or(&Value::Null));
            self.native_value = self.filtered(shaped);
        } else {
            self.available = false;
            self.native_value = Value::Null;
        }
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.available = !value.is_null();
        self.native_value = if value.is_null() {
            Value::Null
        } else {
            let shaped = (self.description.stream_value_fn)(value);
            self.filtered(shaped)
        };
    }

    fn value(&self) -> EntityState {
        let mut state = EntityState::new(state_text(&self.native_value));
        state.available = self.available;
        match self.description.unit {
            Some(unit) => state.with_attribute("unit_of_measurement", unit),
            None => state,
        }
    }

    fn restore(&mut self, base: &VehicleEntityBase, saved: &EntityState) {
        if self.description.streaming_key.is_none()
            || (base.updated_once() && self.description.polled)
        {
            return;
        }
        if let Some(text) = &saved.state {
            self.native_value = auto_type(text);
            self.available = saved.available;
        }
    }
}

/// The vehicle `state` field, read even before full data arrives
pub static VEHICLE_STATE_SENSOR: VehicleSensorDescription = VehicleSensorDescription {
    available_fn: always,
    ..VehicleSensorDescription::new("state")
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn description(key: &str) -> &'static VehicleSensorDescription {
        VEHICLE_SENSORS
            .iter()
            .find(|d| d.key == key)
            .unwrap()
    }

    #[test]
    fn test_charge_state_map() {
        assert_eq!(charge_state("NoPower"), Some("no_power"));
        assert_eq!(charge_state("Other"), None);
        let desc = description("charge_state_charging_state");
        assert_eq!((desc.value_fn)(&json!("Charging")), json!("charging"));
    }

    #[test]
    fn test_shift_state_defaults_to_park() {
        let desc = description("drive_state_shift_state");
        assert_eq!((desc.value_fn)(&Value::Null), json!("p"));
        assert_eq!((desc.value_fn)(&json!("D")), json!("d"));
        assert!((desc.available_fn)(None));
        assert_eq!((desc.stream_value_fn)(&json!("X")), Value::Null);
    }

    #[test]
    fn test_minutes_to_full_needs_positive_value() {
        let desc = description("charge_state_minutes_to_full_charge");
        assert!(!(desc.available_fn)(Some(&json!(0))));
        assert!((desc.available_fn)(Some(&json!(35))));
        assert!(!(desc.available_fn)(None));
    }

    #[test]
    fn test_speed_defaults_to_zero() {
        let desc = description("drive_state_speed");
        assert_eq!((desc.value_fn)(&Value::Null), json!(0));
        assert_eq!((desc.stream_value_fn)(&json!("42")), json!(42));
    }

    #[test]
    fn test_section_timestamp() {
        assert_eq!(
            section_timestamp("charge_state_battery_level"),
            Some("charge_state_timestamp")
        );
        assert_eq!(section_timestamp("state"), None);
    }

    #[test]
    fn test_stream_null_makes_unavailable() {
        let mut sensor = VehicleSensor::new(description("vehicle_state_odometer"));
        sensor.read_from_stream(&json!("12345.6"));
        assert_eq!(sensor.native_value(), &json!(12345.6));
        sensor.read_from_stream(&Value::Null);
        assert!(!sensor.value().available);
    }

    #[test]
    fn test_streamed_range_holds_small_drops() {
        let mut sensor = VehicleSensor::new(description("charge_state_est_battery_range"));
        sensor.read_from_stream(&json!("250.4"));
        sensor.read_from_stream(&json!("249.9"));
        assert_eq!(sensor.native_value(), &json!(250.4));
        sensor.read_from_stream(&json!("240"));
        assert_eq!(sensor.native_value(), &json!(240));
    }

    #[test]
    fn test_sentry_mode_state_names() {
        let desc = description("sentry_mode");
        assert!(!desc.polled);
        assert_eq!((desc.stream_value_fn)(&json!("SentryModeStateArmed")), json!("armed"));
        assert_eq!((desc.stream_value_fn)(&json!("SentryModeState")), Value::Null);
    }
}
