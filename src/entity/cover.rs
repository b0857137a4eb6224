use super::base::{VehicleEntity, VehicleEntityBase, VehicleEntityKind};
use super::{EntityCommand, EntityState, Platform};
use crate::api::{Scope, SunRoofCommand, Trunk, VehicleCommand, WindowCommand};
use crate::error::Result;
use crate::helpers::is_truthy;
use async_trait::async_trait;
use serde_json::Value;

pub type CoverEntity = VehicleEntity<VehicleCover>;

const WINDOW_KEYS: [&str; 4] = [
    "vehicle_state_fd_window",
    "vehicle_state_fp_window",
    "vehicle_state_rd_window",
    "vehicle_state_rp_window",
];

/// Which opening a cover entity controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverKind {
    /// All four windows together
    Windows,
    ChargePort,
    FrontTrunk,
    RearTrunk,
    /// Only created when `vehicle_config_sun_roof_installed` is set
    Sunroof,
}

impl CoverKind {
    pub const ALL: [CoverKind; 5] = [
        CoverKind::Windows,
        CoverKind::ChargePort,
        CoverKind::FrontTrunk,
        CoverKind::RearTrunk,
        CoverKind::Sunroof,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            CoverKind::Windows => "windows",
            CoverKind::ChargePort => "charge_state_charge_port_door_open",
            CoverKind::FrontTrunk => "vehicle_state_ft",
            CoverKind::RearTrunk => "vehicle_state_rt",
            CoverKind::Sunroof => "vehicle_state_sun_roof_state",
        }
    }

    fn features(&self) -> &'static [&'static str] {
        match self {
            CoverKind::FrontTrunk => &["open"],
            CoverKind::Sunroof => &["open", "close", "stop"],
            _ => &["open", "close"],
        }
    }
}

/// `Some(true)` when `value` is present and equals `closed`
fn exactly(value: Option<Value>, closed: &Value) -> Option<bool> {
    value.filter(|v| !v.is_null()).map(|v| v == *closed)
}

/// Open when any window is open, unknown when any is missing
fn windows_closed(values: &[Option<Value>]) -> Option<bool> {
    let open = |v: &Option<Value>| v.as_ref().is_some_and(|v| v.as_i64() == Some(1));
    if values.iter().any(open) {
        Some(false)
    } else if values.iter().any(|v| v.as_ref().is_none_or(Value::is_null)) {
        None
    } else {
        Some(true)
    }
}

/// Door state arrives as an object of flags, sometimes JSON-encoded
fn door_open(value: &Value, door: &str) -> Option<bool> {
    let parsed;
    let object = match value {
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).ok()?;
            &parsed
        }
        other => other,
    };
    object.get(door).and_then(Value::as_bool)
}

#[derive(Debug, Clone)]
pub struct VehicleCover {
    kind: CoverKind,
    is_closed: Option<bool>,
    position: Option<Value>,
    scoped: bool,
}

impl VehicleCover {
    pub fn new(kind: CoverKind) -> Self {
        Self {
            kind,
            is_closed: None,
            position: None,
            scoped: false,
        }
    }

    pub fn is_closed(&self) -> Option<bool> {
        self.is_closed
    }

    async fn actuate(
        &mut self,
        base: &VehicleEntityBase,
        command: VehicleCommand,
        closed: bool,
    ) -> Result<()> {
        base.send(command).await?;
        self.is_closed = Some(closed);
        Ok(())
    }
}

#[async_trait]
impl VehicleEntityKind for VehicleCover {
    fn platform(&self) -> Platform {
        Platform::Cover
    }

    fn key(&self) -> &str {
        self.kind.key()
    }

    fn timestamp_key(&self) -> Option<&'static str> {
        match self.kind {
            CoverKind::ChargePort => Some("charge_state_timestamp"),
            _ => Some("vehicle_state_timestamp"),
        }
    }

    fn streaming_key(&self) -> Option<&'static str> {
        match self.kind {
            CoverKind::ChargePort => Some("ChargePortDoorOpen"),
            CoverKind::FrontTrunk | CoverKind::RearTrunk => Some("DoorState"),
            CoverKind::Windows | CoverKind::Sunroof => None,
        }
    }

    fn required_scopes(&self) -> &'static [Scope] {
        match self.kind {
            CoverKind::ChargePort => &[Scope::VehicleCmds, Scope::VehicleChargingCmds],
            _ => &[Scope::VehicleCmds],
        }
    }

    fn attach(&mut self, base: &VehicleEntityBase) {
        self.scoped = base.scoped();
    }

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase) {
        self.is_closed = match self.kind {
            CoverKind::Windows => {
                let values: Vec<Option<Value>> = WINDOW_KEYS.iter().map(|k| base.get(k)).collect();
                windows_closed(&values)
            }
            CoverKind::ChargePort => exactly(base.value(), &Value::Bool(false)),
            CoverKind::FrontTrunk | CoverKind::RearTrunk => exactly(base.value(), &Value::from(0)),
            CoverKind::Sunroof => {
                self.position = base
                    .get("vehicle_state_sun_roof_percent_open")
                    .filter(|v| !v.is_null());
                match base.value() {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) if s == "unknown" => None,
                    Some(value) => Some(value.as_str() == Some("closed")),
                }
            }
        };
    }

    fn read_from_stream(&mut self, value: &Value) {
        self.is_closed = match self.kind {
            CoverKind::ChargePort if value.is_null() => None,
            CoverKind::ChargePort => {
                let open = match value {
                    Value::String(s) => s.eq_ignore_ascii_case("true"),
                    other => is_truthy(Some(other)),
                };
                Some(!open)
            }
            CoverKind::FrontTrunk => door_open(value, "TrunkFront").map(|open| !open),
            CoverKind::RearTrunk => door_open(value, "TrunkRear").map(|open| !open),
            CoverKind::Windows | CoverKind::Sunroof => self.is_closed,
        };
    }

    async fn apply_command(
        &mut self,
        base: &VehicleEntityBase,
        command: EntityCommand,
    ) -> Result<()> {
        match (self.kind, command) {
            (CoverKind::Windows, EntityCommand::OpenCover) => {
                let command = VehicleCommand::WindowControl {
                    command: WindowCommand::Vent,
                };
                self.actuate(base, command, false).await
            }
            (CoverKind::Windows, EntityCommand::CloseCover) => {
                let command = VehicleCommand::WindowControl {
                    command: WindowCommand::Close,
                };
                self.actuate(base, command, true).await
            }
            (CoverKind::ChargePort, EntityCommand::OpenCover) => {
                self.actuate(base, VehicleCommand::ChargePortDoorOpen, false)
                    .await
            }
            (CoverKind::ChargePort, EntityCommand::CloseCover) => {
                self.actuate(base, VehicleCommand::ChargePortDoorClose, true)
                    .await
            }
            (CoverKind::FrontTrunk, EntityCommand::OpenCover) => {
                let command = VehicleCommand::ActuateTrunk {
                    which_trunk: Trunk::Front,
                };
                self.actuate(base, command, false).await
            }
            // The rear trunk toggles, so only actuate when it is not already there
            (CoverKind::RearTrunk, EntityCommand::OpenCover) => {
                if self.is_closed == Some(false) {
                    return Ok(());
                }
                let command = VehicleCommand::ActuateTrunk {
                    which_trunk: Trunk::Rear,
                };
                self.actuate(base, command, false).await
            }
            (CoverKind::RearTrunk, EntityCommand::CloseCover) => {
                if self.is_closed == Some(true) {
                    return Ok(());
                }
                let command = VehicleCommand::ActuateTrunk {
                    which_trunk: Trunk::Rear,
                };
                self.actuate(base, command, true).await
            }
            (CoverKind::Sunroof, command @ (EntityCommand::OpenCover
            | EntityCommand::CloseCover
            | EntityCommand::StopCover)) => {
                let (state, closed) = match command {
                    EntityCommand::CloseCover => (SunRoofCommand::Close, true),
                    EntityCommand::StopCover => (SunRoofCommand::Stop, false),
                    _ => (SunRoofCommand::Vent, false),
                };
                self.actuate(base, VehicleCommand::SunRoofControl { state }, closed)
                    .await
            }
            (_, other) => Err(other.unsupported()),
        }
    }

    fn value(&self) -> EntityState {
        let state = self
            .is_closed
            .map(|closed| if closed { "closed" } else { "open" }.to_string());
        let features: &[&str] = if self.scoped { self.kind.features() } else { &[] };
        let state = EntityState::new(state).with_attribute("supported_features", features.to_vec());
        match &self.position {
            Some(position) => state.with_attribute("current_position", position.clone()),
            None => state,
        }
    }

    fn restore(&mut self, base: &VehicleEntityBase, saved: &EntityState) {
        if base.updated_once() {
            return;
        }
        self.is_closed = match saved.state.as_deref() {
            Some("open") => Some(false),
            Some("closed") => Some(true),
            _ => self.is_closed,
        };
    }
}
