use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::{EntityState, Platform, as_f64, number_or_null};
use async_trait::async_trait;
use serde_json::Value;

pub type DeviceTrackerEntity = VehicleEntity<VehicleLocation>;

/// A position the vehicle reports
#[derive(Debug, Clone, Copy)]
pub struct LocationDescription {
    pub key: &'static str,
    /// `{prefix}_latitude` and friends in polled data; `None` when only streamed
    pub polling_prefix: Option<&'static str>,
    pub streaming_key: &'static str,
}

pub static LOCATIONS: &[LocationDescription] = &[
    LocationDescription {
        key: "location",
        polling_prefix: Some("drive_state"),
        streaming_key: "Location",
    },
    LocationDescription {
        key: "route",
        polling_prefix: Some("drive_state_active_route"),
        streaming_key: "DestinationLocation",
    },
    LocationDescription {
        key: "origin",
        polling_prefix: None,
        streaming_key: "OriginLocation",
    },
];

/// Latitude and longitude from a streamed location, sometimes JSON-encoded
fn coordinates(value: &Value) -> Option<(f64, f64)> {
    let parsed;
    let object = match value {
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).ok()?;
            &parsed
        }
        other => other,
    };
    let latitude = object.get("latitude").and_then(as_f64)?;
    let longitude = object.get("longitude").and_then(as_f64)?;
    Some((latitude, longitude))
}

#[derive(Debug, Clone)]
pub struct VehicleLocation {
    description: &'static LocationDescription,
    latitude: Option<f64>,
    longitude: Option<f64>,
    location_name: Option<String>,
}

impl VehicleLocation {
    pub fn new(description: &'static LocationDescription) -> Self {
        Self {
            description,
            latitude: None,
            longitude: None,
            location_name: None,
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

#[async_trait]
impl VehicleEntityKind for VehicleLocation {
    fn platform(&self) -> Platform {
        Platform::DeviceTracker
    }

    fn key(&self) -> &str {
        self.description.key
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        self.description
            .polling_prefix
            .map(|_| "drive_state_timestamp")
    }

    fn streaming_key(&self) -> Option<&'static str> {
        Some(self.description.streaming_key)
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        let Some(prefix) = self.description.polling_prefix else {
            return;
        };
        self.latitude = base.get_f64(&format!("{}_latitude", prefix));
        self.longitude = base.get_f64(&format!("{}_longitude", prefix));
        self.location_name = base
            .get(&format!("{}_destination", prefix))
            .and_then(|v| v.as_str().map(str::to_string))
            .map(|name| if name == "Home" { "home".to_string() } else { name });
    }

    fn read_from_stream(&mut self, value: &Value) {
        let (latitude, longitude) = coordinates(value).unzip();
        self.latitude = latitude;
        self.longitude = longitude;
    }

    fn value(&self) -> EntityState {
        let available = self.coordinates().is_some();
        let state = match &self.location_name {
            Some(name) => Some(name.clone()),
            None if available => Some("not_home".to_string()),
            None => None,
        };
        let mut state = EntityState::new(state)
            .with_attribute("latitude", number_or_null(self.latitude))
            .with_attribute("longitude", number_or_null(self.longitude));
        state.available = available;
        state
    }
}
