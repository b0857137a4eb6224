mod common;

use common::{SITE_ID, VIN, loaded_site, loaded_vehicle, test_config};
use serde_json::{Value, json};
use teslemetry_bridge::BridgeError;
use teslemetry_bridge::api::{EnergyCommand, VehicleCommand};
use teslemetry_bridge::entity::{
    CHARGE_FROM_GRID_SWITCH, EnergySwitch, EnergySwitchEntity, Entity, EntityCommand,
    EntityOptions, EntityState, STORM_MODE_SWITCH, VEHICLE_SWITCHES, VehicleSwitch,
    VehicleSwitchDescription, VehicleSwitchEntity,
};

fn description(key: &str) -> &'static VehicleSwitchDescription {
    VEHICLE_SWITCHES.iter().find(|d| d.key == key).unwrap()
}

fn switch_data() -> Value {
    json!({
        "vehicle_state": {"timestamp": 1_700_000_000_000i64, "sentry_mode": false},
        "charge_state": {
            "timestamp": 1_700_000_000_000i64,
            "user_charge_enable_request": null,
            "charge_enable_request": true
        }
    })
}

#[tokio::test]
async fn sentry_switch_sends_command() {
    let config = test_config();
    let (api, vehicle) = loaded_vehicle(VIN, switch_data(), &config).await;
    let hub = vehicle.hub().clone();
    let mut entity = VehicleSwitchEntity::new(
        vehicle,
        VehicleSwitch::new(description("vehicle_state_sentry_mode")),
        EntityOptions::from_config(&config, true),
    );
    assert_eq!(entity.state().state.as_deref(), Some("off"));

    entity.apply_command(EntityCommand::TurnOn).await.unwrap();

    assert_eq!(api.commands(), vec![VehicleCommand::SetSentryMode { on: true }]);
    assert_eq!(hub.state(entity.unique_id()).unwrap().state.as_deref(), Some("on"));
}

#[tokio::test]
async fn charge_switch_reads_fallback_field() {
    let config = test_config();
    let (api, vehicle) = loaded_vehicle(VIN, switch_data(), &config).await;
    let mut entity = VehicleSwitchEntity::new(
        vehicle,
        VehicleSwitch::new(description("charge_state_user_charge_enable_request")),
        EntityOptions::from_config(&config, true),
    );
    assert_eq!(entity.kind().is_on(), Some(true));

    entity.apply_command(EntityCommand::TurnOff).await.unwrap();
    assert_eq!(api.commands(), vec![VehicleCommand::ChargeStop]);
    assert_eq!(entity.kind().is_on(), Some(false));
}

#[tokio::test]
async fn switch_without_scope_refuses_commands() {
    let config = test_config();
    let (api, vehicle) = loaded_vehicle(VIN, switch_data(), &config).await;
    let mut entity = VehicleSwitchEntity::new(
        vehicle,
        VehicleSwitch::new(description("vehicle_state_valet_mode")),
        EntityOptions::from_config(&config, false),
    );

    let err = entity.apply_command(EntityCommand::TurnOn).await.unwrap_err();
    assert!(matches!(err, BridgeError::MissingScope { .. }));
    assert!(api.commands().is_empty());

    let err = entity
        .apply_command(EntityCommand::SetValue(1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { .. }));
}

#[tokio::test]
async fn restore_applies_before_first_poll_only() {
    let config = test_config();
    let (_, vehicle) = loaded_vehicle(VIN, switch_data(), &config).await;
    let mut entity = VehicleSwitchEntity::new(
        vehicle,
        VehicleSwitch::new(description("vehicle_state_sentry_mode")),
        EntityOptions::from_config(&config, true),
    );

    entity.restore(&EntityState::new(Some("on".to_string())));
    assert_eq!(entity.kind().is_on(), Some(false));
}

#[tokio::test]
async fn storm_mode_switch_sends_site_command() {
    let config = test_config();
    let (api, site) = loaded_site(
        json!({"user_settings_storm_mode_enabled": false}),
        json!({"components_storm_mode_capable": true}),
        &config,
    )
    .await;
    let mut entity = EnergySwitchEntity::new(site, EnergySwitch::new(&STORM_MODE_SWITCH), true);
    assert_eq!(entity.unique_id(), format!("{}-user_settings_storm_mode_enabled", SITE_ID));
    assert_eq!(entity.state().state.as_deref(), Some("off"));

    entity.apply_command(EntityCommand::TurnOn).await.unwrap();

    assert_eq!(api.commands(), vec![EnergyCommand::StormMode { enabled: true }]);
    assert_eq!(entity.state().state.as_deref(), Some("on"));
}

#[tokio::test]
async fn energy_switch_needs_energy_scope() {
    let config = test_config();
    let (api, site) = loaded_site(json!({}), json!({}), &config).await;
    let mut entity = EnergySwitchEntity::new(site, EnergySwitch::new(&STORM_MODE_SWITCH), false);

    let err = entity.apply_command(EntityCommand::TurnOn).await.unwrap_err();
    assert!(matches!(err, BridgeError::MissingScope { .. }));
    assert!(err.to_string().contains("energy_cmds"));
    assert!(api.commands().is_empty());
    assert_eq!(entity.state().state, None);
}

#[tokio::test]
async fn charge_from_grid_is_inverted() {
    let config = test_config();
    let (api, site) = loaded_site(
        json!({}),
        json!({"components": {"disallow_charge_from_grid_with_solar_installed": true}}),
        &config,
    )
    .await;
    let mut entity = EnergySwitchEntity::new(site, EnergySwitch::new(&CHARGE_FROM_GRID_SWITCH), true);
    assert_eq!(entity.state().state.as_deref(), Some("off"));

    entity.apply_command(EntityCommand::TurnOn).await.unwrap();
    assert_eq!(
        api.commands(),
        vec![EnergyCommand::GridImportExport {
            disallow_charge_from_grid_with_solar_installed: Some(false),
            customer_preferred_export_rule: None,
        }]
    );
    assert_eq!(entity.state().state.as_deref(), Some("on"));
}
