use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::{EntityCommand, EntityState, Platform, as_f64};
use crate::api::VehicleCommand;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

const AVAILABLE: &str = "available";
const SCHEDULED: &str = "scheduled";
const INSTALLING: &str = "installing";
const DOWNLOADING: &str = "downloading";
const WIFI_WAIT: &str = "downloading_wifi_wait";

/// Delay before a scheduled install starts
const INSTALL_OFFSET_SECS: u32 = 60;

pub type UpdateEntity = VehicleEntity<SoftwareUpdate>;

/// Vehicle firmware update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftwareUpdate {
    status: Option<String>,
    installed_version: Option<String>,
    latest_version: Option<String>,
    /// Install percentage, or `None` when no install is running
    in_progress: Option<f64>,
    can_install: bool,
}

impl SoftwareUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn installed_version(&self) -> Option<&str> {
        self.installed_version.as_deref()
    }

    pub fn latest_version(&self) -> Option<&str> {
        self.latest_version.as_deref()
    }

    pub fn can_install(&self) -> bool {
        self.can_install
    }
}

/// Version without the build suffix
pub fn installed_version(car_version: &str) -> &str {
    car_version.split_whitespace().next().unwrap_or(car_version)
}

#[async_trait]
impl VehicleEntityKind for SoftwareUpdate {
    fn platform(&self) -> Platform {
        Platform::Update
    }

    fn key(&self) -> &str {
        "vehicle_state_software_update_status"
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        Some("vehicle_state_timestamp")
    }

    fn streaming_key(&self) -> Option<&'static str> {
        Some("Version")
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        let status = base
            .value()
            .and_then(|v| v.as_str().map(str::to_string));
        let status_str = status.as_deref().unwrap_or_default();

        self.can_install = base.scoped() && matches!(status_str, AVAILABLE | SCHEDULED);

        self.installed_version = base
            .get("vehicle_state_car_version")
            .and_then(|v| v.as_str().map(|s| installed_version(s).to_string()));

        self.latest_version = if matches!(
            status_str,
            AVAILABLE | SCHEDULED | INSTALLING | DOWNLOADING | WIFI_WAIT
        ) {
            base.get("vehicle_state_software_update_version")
                .and_then(|v| v.as_str().map(str::to_string))
        } else {
            self.installed_version.clone()
        };

        self.in_progress = if matches!(status_str, SCHEDULED | INSTALLING) {
            base.get_f64("vehicle_state_software_update_install_perc")
        } else {
            None
        };
        self.status = status;
    }

    fn read_from_stream(&mut self, value: &Value) {
        if let Some(version) = value.as_str()
            && version != " "
        {
            self.installed_version = Some(version.to_string());
        }
    }

    async fn apply_command(&mut self, base: &VehicleEntityBase, command: EntityCommand) -> Result<()> {
        match command {
            EntityCommand::Install => {
                base.send(VehicleCommand::ScheduleSoftwareUpdate {
                    offset_sec: INSTALL_OFFSET_SECS,
                })
                .await?;
                self.status = Some(INSTALLING.to_string());
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }

    fn value(&self) -> EntityState {
        let update_available = match (&self.installed_version, &self.latest_version) {
            (Some(installed), Some(latest)) => Some(installed != latest),
            _ => None,
        };
        let state = update_available.map(|a| if a { "on" } else { "off" }.to_string());
        let in_progress = self
            .in_progress
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Bool(false), Value::Number);

        let mut features = vec!["progress"];
        if self.can_install {
            features.push("install");
        }
        EntityState::new(state)
            .with_attribute("installed_version", self.installed_version.clone())
            .with_attribute("latest_version", self.latest_version.clone())
            .with_attribute("in_progress", in_progress)
            .with_attribute("status", self.status.clone())
            .with_attribute("supported_features", json!(features))
    }

    fn restore(&mut self, base: &VehicleEntityBase, saved: &EntityState) {
        if base.updated_once() {
            return;
        }
        self.installed_version = saved
            .attribute("installed_version")
            .and_then(|v| v.as_str().map(str::to_string));
        self.in_progress = saved.attribute("in_progress").and_then(as_f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installed_version_strips_build() {
        assert_eq!(installed_version("2024.8.9 abcdef"), "2024.8.9");
        assert_eq!(installed_version("2024.8.9"), "2024.8.9");
        assert_eq!(installed_version(""), "");
    }

    #[test]
    fn test_stream_ignores_blank_version() {
        let mut update = SoftwareUpdate::new();
        update.read_from_stream(&json!(" "));
        assert_eq!(update.installed_version(), None);
        update.read_from_stream(&json!("2024.14.3"));
        assert_eq!(update.installed_version(), Some("2024.14.3"));
    }

    #[test]
    fn test_value_reports_pending_update() {
        let update = SoftwareUpdate {
            status: Some(AVAILABLE.to_string()),
            installed_version: Some("2024.8.9".to_string()),
            latest_version: Some("2024.14.3".to_string()),
            in_progress: None,
            can_install: true,
        };
        let state = update.value();
        assert_eq!(state.state.as_deref(), Some("on"));
        assert_eq!(state.attribute("in_progress"), Some(&Value::Bool(false)));
        assert_eq!(
            state.attribute("supported_features"),
            Some(&json!(["progress", "install"]))
        );
    }
}
