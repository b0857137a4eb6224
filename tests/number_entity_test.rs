mod common;

use common::{VIN, loaded_site, loaded_vehicle, test_config};
use serde_json::{Value, json};
use teslemetry_bridge::BridgeError;
use teslemetry_bridge::api::{EnergyCommand, VehicleCommand};
use teslemetry_bridge::entity::{
    ENERGY_NUMBERS, EnergyNumber, EnergyNumberEntity, Entity, EntityCommand, EntityOptions,
    VEHICLE_NUMBERS, VehicleNumber, VehicleNumberEntity,
};

const T0: i64 = 1_700_000_000_000;

fn number_data() -> Value {
    json!({
        "charge_state": {
            "timestamp": T0,
            "charge_current_request": 16,
            "charge_current_request_max": 32,
            "charge_limit_soc": 80,
            "charge_limit_soc_min": 50,
            "charge_limit_soc_max": 100
        },
        "vehicle_state": {
            "timestamp": T0,
            "speed_limit_mode": {
                "current_limit_mph": 65.0,
                "min_limit_mph": 50,
                "max_limit_mph": 120
            }
        }
    })
}

fn number(key: &str) -> VehicleNumber {
    VehicleNumber::new(VEHICLE_NUMBERS.iter().find(|d| d.key == key).unwrap())
}

#[tokio::test]
async fn charge_current_sends_whole_amps() {
    let config = test_config();
    let (api, vehicle) = loaded_vehicle(VIN, number_data(), &config).await;
    let mut entity = VehicleNumberEntity::new(
        vehicle,
        number("charge_state_charge_current_request"),
        EntityOptions::from_config(&config, true),
    );
    let state = entity.state();
    assert_eq!(state.state.as_deref(), Some("16"));
    assert_eq!(state.attribute("max"), Some(&json!(32.0)));
    assert_eq!(state.attribute("unit_of_measurement"), Some(&json!("A")));

    entity.apply_command(EntityCommand::SetValue(24.7)).await.unwrap();
    assert_eq!(
        api.commands(),
        vec![VehicleCommand::SetChargingAmps { charging_amps: 24 }]
    );
    assert_eq!(entity.state().state.as_deref(), Some("24"));
}

#[tokio::test]
async fn value_outside_range_is_rejected() {
    let config = test_config();
    let (api, vehicle) = loaded_vehicle(VIN, number_data(), &config).await;
    let mut entity = VehicleNumberEntity::new(
        vehicle,
        number("charge_state_charge_current_request"),
        EntityOptions::from_config(&config, true),
    );

    let err = entity
        .apply_command(EntityCommand::SetValue(40.0))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { .. }));
    assert!(api.commands().is_empty());
    assert_eq!(entity.kind().native_value(), Some(16.0));
}

#[tokio::test]
async fn charge_limit_names_both_scopes() {
    let config = test_config();
    let (api, vehicle) = loaded_vehicle(VIN, number_data(), &config).await;
    let mut entity = VehicleNumberEntity::new(
        vehicle,
        number("charge_state_charge_limit_soc"),
        EntityOptions::from_config(&config, false),
    );
    assert_eq!(entity.kind().range(), (50.0, 100.0));

    let err = entity
        .apply_command(EntityCommand::SetValue(90.0))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::MissingScope { .. }));
    assert!(err.to_string().contains("vehicle_charging_cmds or vehicle_cmds"));
    assert!(api.commands().is_empty());
}

#[tokio::test]
async fn metric_speed_limit_converts_both_ways() {
    let config = test_config();
    let (api, vehicle) = loaded_vehicle(VIN, number_data(), &config).await;
    let mut entity = VehicleNumberEntity::new(
        vehicle,
        number("vehicle_state_speed_limit_mode_current_limit_kph"),
        EntityOptions::from_config(&config, true),
    );
    let state = entity.state();
    assert_eq!(state.state.as_deref(), Some("104.6"));
    assert_eq!(state.attribute("min"), Some(&json!(80.5)));
    assert_eq!(state.attribute("max"), Some(&json!(193.1)));
    assert_eq!(state.attribute("unit_of_measurement"), Some(&json!("km/h")));

    entity.apply_command(EntityCommand::SetValue(100.0)).await.unwrap();
    assert_eq!(
        api.commands(),
        vec![VehicleCommand::SpeedLimitSetLimit { limit_mph: 62.1371 }]
    );
}

#[tokio::test]
async fn backup_reserve_sends_site_command() {
    let config = test_config();
    let (api, site) = loaded_site(
        json!({}),
        json!({"backup_reserve_percent": 20, "components": {"battery": true}}),
        &config,
    )
    .await;
    let description = ENERGY_NUMBERS
        .iter()
        .find(|d| d.key == "backup_reserve_percent")
        .unwrap();
    let mut entity = EnergyNumberEntity::new(site, EnergyNumber::new(description), true);
    assert_eq!(entity.state().state.as_deref(), Some("20"));

    let err = entity
        .apply_command(EntityCommand::SetValue(120.0))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { .. }));

    entity.apply_command(EntityCommand::SetValue(35.0)).await.unwrap();
    assert_eq!(
        api.commands(),
        vec![EnergyCommand::Backup {
            backup_reserve_percent: 35
        }]
    );
    assert_eq!(entity.state().state.as_deref(), Some("35"));
}
