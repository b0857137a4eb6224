use serde_json::{Value, json};

/// Vehicle commands issued by entities
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleCommand {
    AutoConditioningStart,
    AutoConditioningStop,
    SetTemps { driver_temp: f64, passenger_temp: f64 },
    SetClimateKeeperMode { climate_keeper_mode: u8 },
    SetBioweaponMode { on: bool, manual_override: bool },
    SetCopTemp { cop_temp: u8 },
    SetCabinOverheatProtection { on: bool, fan_only: bool },
    DoorLock,
    DoorUnlock,
    ChargePortDoorOpen,
    SpeedLimitActivate { pin: String },
    SpeedLimitDeactivate { pin: String },
    ScheduleSoftwareUpdate { offset_sec: u32 },
    SetSentryMode { on: bool },
    SetValetMode { on: bool },
    RemoteAutoSeatClimateRequest { seat: Seat, on: bool },
    RemoteAutoSteeringWheelHeatClimateRequest { on: bool },
    SetPreconditioningMax { on: bool, manual_override: bool },
    ChargeStart,
    ChargeStop,
    WindowControl { command: WindowCommand },
    ChargePortDoorClose,
    ActuateTrunk { which_trunk: Trunk },
    SunRoofControl { state: SunRoofCommand },
    RemoteSeatHeaterRequest { seat: Seat, level: u8 },
    SetChargingAmps { charging_amps: u32 },
    SetChargeLimit { percent: u32 },
    SpeedLimitSetLimit { limit_mph: f64 },
}

/// Seat positions as numbered by the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    FrontLeft = 0,
    FrontRight = 1,
    RearLeft = 2,
    RearCenter = 4,
    RearRight = 5,
    ThirdLeft = 7,
    ThirdRight = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCommand {
    Vent,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trunk {
    Front,
    Rear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunRoofCommand {
    Vent,
    Close,
    Stop,
}

impl WindowCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowCommand::Vent => "vent",
            WindowCommand::Close => "close",
        }
    }
}

impl Trunk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trunk::Front => "front",
            Trunk::Rear => "rear",
        }
    }
}

impl SunRoofCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SunRoofCommand::Vent => "vent",
            SunRoofCommand::Close => "close",
            SunRoofCommand::Stop => "stop",
        }
    }
}

impl VehicleCommand {
    /// Path segment under `/api/1/vehicles/{vin}/command/`
    pub fn endpoint(&self) -> &'static str {
        match self {
            VehicleCommand::AutoConditioningStart => "auto_conditioning_start",
            VehicleCommand::AutoConditioningStop => "auto_conditioning_stop",
            VehicleCommand::SetTemps { .. } => "set_temps",
            VehicleCommand::SetClimateKeeperMode { .. } => "set_climate_keeper_mode",
            VehicleCommand::SetBioweaponMode { .. } => "set_bioweapon_mode",
            VehicleCommand::SetCopTemp { .. } => "set_cop_temp",
            VehicleCommand::SetCabinOverheatProtection { .. } => "set_cabin_overheat_protection",
            VehicleCommand::DoorLock => "door_lock",
            VehicleCommand::DoorUnlock => "door_unlock",
            VehicleCommand::ChargePortDoorOpen => "charge_port_door_open",
            VehicleCommand::SpeedLimitActivate { .. } => "speed_limit_activate",
            VehicleCommand::SpeedLimitDeactivate { .. } => "speed_limit_deactivate",
            VehicleCommand::ScheduleSoftwareUpdate { .. } => "schedule_software_update",
            VehicleCommand::SetSentryMode { .. } => "set_sentry_mode",
            VehicleCommand::SetValetMode { .. } => "set_valet_mode",
            VehicleCommand::RemoteAutoSeatClimateRequest { .. } => {
                "remote_auto_seat_climate_request"
            }
            VehicleCommand::RemoteAutoSteeringWheelHeatClimateRequest { .. } => {
                "remote_auto_steering_wheel_heat_climate_request"
            }
            VehicleCommand::SetPreconditioningMax { .. } => "set_preconditioning_max",
            VehicleCommand::ChargeStart => "charge_start",
            VehicleCommand::ChargeStop => "charge_stop",
            VehicleCommand::WindowControl { .. } => "window_control",
            VehicleCommand::ChargePortDoorClose => "charge_port_door_close",
            VehicleCommand::ActuateTrunk { .. } => "actuate_trunk",
            VehicleCommand::SunRoofControl { .. } => "sun_roof_control",
            VehicleCommand::RemoteSeatHeaterRequest { .. } => "remote_seat_heater_request",
            VehicleCommand::SetChargingAmps { .. } => "set_charging_amps",
            VehicleCommand::SetChargeLimit { .. } => "set_charge_limit",
            VehicleCommand::SpeedLimitSetLimit { .. } => "speed_limit_set_limit",
        }
    }

    /// JSON request body
    pub fn body(&self) -> Value {
        match self {
            VehicleCommand::SetTemps {
                driver_temp,
                passenger_temp,
            } => json!({"driver_temp": driver_temp, "passenger_temp": passenger_temp}),
            VehicleCommand::SetClimateKeeperMode {
                climate_keeper_mode,
            } => json!({"climate_keeper_mode": climate_keeper_mode}),
            VehicleCommand::SetBioweaponMode {
                on,
                manual_override,
            } => json!({"on": on, "manual_override": manual_override}),
            VehicleCommand::SetCopTemp { cop_temp } => json!({"cop_temp": cop_temp}),
            VehicleCommand::SetCabinOverheatProtection { on, fan_only } => {
                json!({"on": on, "fan_only": fan_only})
            }
            VehicleCommand::SpeedLimitActivate { pin }
            | VehicleCommand::SpeedLimitDeactivate { pin } => json!({"pin": pin}),
            VehicleCommand::ScheduleSoftwareUpdate { offset_sec } => {
                json!({"offset_sec": offset_sec})
            }
            VehicleCommand::SetSentryMode { on }
            | VehicleCommand::SetValetMode { on }
            | VehicleCommand::RemoteAutoSteeringWheelHeatClimateRequest { on } => {
                json!({"on": on})
            }
            VehicleCommand::RemoteAutoSeatClimateRequest { seat, on } => {
                json!({"auto_seat_position": *seat as u8, "auto_climate_on": on})
            }
            VehicleCommand::SetPreconditioningMax {
                on,
                manual_override,
            } => json!({"on": on, "manual_override": manual_override}),
            // Location is only checked for closing on some models
            VehicleCommand::WindowControl { command } => {
                json!({"command": command.as_str(), "lat": 0, "lon": 0})
            }
            VehicleCommand::ActuateTrunk { which_trunk } => {
                json!({"which_trunk": which_trunk.as_str()})
            }
            VehicleCommand::SunRoofControl { state } => json!({"state": state.as_str()}),
            VehicleCommand::RemoteSeatHeaterRequest { seat, level } => {
                json!({"heater": *seat as u8, "level": level})
            }
            VehicleCommand::SetChargingAmps { charging_amps } => {
                json!({"charging_amps": charging_amps})
            }
            VehicleCommand::SetChargeLimit { percent } => json!({"percent": percent}),
            VehicleCommand::SpeedLimitSetLimit { limit_mph } => json!({"limit_mph": limit_mph}),
            _ => json!({}),
        }
    }
}

/// Energy site commands issued by entities
#[derive(Debug, Clone, PartialEq)]
pub enum EnergyCommand {
    StormMode { enabled: bool },
    /// Either field may be left out
    GridImportExport {
        disallow_charge_from_grid_with_solar_installed: Option<bool>,
        customer_preferred_export_rule: Option<String>,
    },
    Operation { default_real_mode: String },
    Backup { backup_reserve_percent: u32 },
    OffGridVehicleChargingReserve { percent: u32 },
}

impl EnergyCommand {
    /// Path segment under `/api/1/energy_sites/{id}/`
    pub fn endpoint(&self) -> &'static str {
        match self {
            EnergyCommand::StormMode { .. } => "storm_mode",
            EnergyCommand::GridImportExport { .. } => "grid_import_export",
            EnergyCommand::Operation { .. } => "operation",
            EnergyCommand::Backup { .. } => "backup",
            EnergyCommand::OffGridVehicleChargingReserve { .. } => {
                "off_grid_vehicle_charging_reserve"
            }
        }
    }

    pub fn body(&self) -> Value {
        match self {
            EnergyCommand::StormMode { enabled } => json!({"enabled": enabled}),
            EnergyCommand::GridImportExport {
                disallow_charge_from_grid_with_solar_installed,
                customer_preferred_export_rule,
            } => {
                let mut body = serde_json::Map::new();
                if let Some(disallow) = disallow_charge_from_grid_with_solar_installed {
                    body.insert(
                        "disallow_charge_from_grid_with_solar_installed".to_string(),
                        Value::from(*disallow),
                    );
                }
                if let Some(rule) = customer_preferred_export_rule {
                    body.insert(
                        "customer_preferred_export_rule".to_string(),
                        Value::from(rule.clone()),
                    );
                }
                Value::Object(body)
            }
            EnergyCommand::Operation { default_real_mode } => {
                json!({"default_real_mode": default_real_mode})
            }
            EnergyCommand::Backup {
                backup_reserve_percent,
            } => json!({"backup_reserve_percent": backup_reserve_percent}),
            EnergyCommand::OffGridVehicleChargingReserve { percent } => {
                json!({"off_grid_vehicle_charging_reserve_percent": percent})
            }
        }
    }
}
