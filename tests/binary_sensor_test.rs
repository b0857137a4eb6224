mod common;

use common::{SITE_ID, VIN, loaded_site, loaded_vehicle, test_config};
use serde_json::{Map, Value, json};
use teslemetry_bridge::coordinator::Coordinator;
use teslemetry_bridge::entity::{
    ENERGY_BINARY_SENSORS, EnergyBinarySensor, EnergyBinarySensorEntity, Entity, EntityOptions,
    EntityState, Reconciled, VEHICLE_BINARY_SENSORS, VehicleBinarySensor,
    VehicleBinarySensorDescription, VehicleBinarySensorEntity,
};
use teslemetry_bridge::stream::{StreamMessage, StreamPayload};

const T0: i64 = 1_700_000_000_000;

fn description(key: &str) -> &'static VehicleBinarySensorDescription {
    VEHICLE_BINARY_SENSORS.iter().find(|d| d.key == key).unwrap()
}

fn stream_field(key: &str, value: Value, timestamp: i64) -> StreamMessage {
    let mut fields = Map::new();
    fields.insert(key.to_string(), value);
    StreamMessage {
        vin: VIN.to_string(),
        timestamp,
        payload: StreamPayload::Data(fields),
    }
}

fn flags() -> Value {
    json!({
        "charge_state": {
            "timestamp": T0,
            "charger_phases": 3,
            "battery_heater_on": false,
            "conn_charge_cable": "<invalid>"
        },
        "vehicle_state": {"timestamp": T0, "fd_window": 1, "df": 0}
    })
}

#[tokio::test]
async fn polled_flags_map_to_on_off() {
    let config = test_config();
    let (_, vehicle) = loaded_vehicle(VIN, flags(), &config).await;
    let options = EntityOptions::from_config(&config, true);
    let state = |key: &str| {
        VehicleBinarySensorEntity::new(
            vehicle.clone(),
            VehicleBinarySensor::new(description(key)),
            options.clone(),
        )
        .state()
    };

    assert_eq!(state("charge_state_charger_phases").state.as_deref(), Some("on"));
    assert_eq!(state("charge_state_battery_heater_on").state.as_deref(), Some("off"));
    assert_eq!(state("charge_state_conn_charge_cable").state.as_deref(), Some("off"));
    assert_eq!(state("vehicle_state_fd_window").state.as_deref(), Some("on"));
    assert_eq!(state("vehicle_state_df").state.as_deref(), Some("off"));

    let missing = state("charge_state_trip_charging");
    assert!(!missing.available);
    assert_eq!(missing.state, None);
}

#[tokio::test]
async fn streamed_window_state_overrides_poll() {
    let config = test_config();
    let (_, vehicle) = loaded_vehicle(VIN, flags(), &config).await;
    let mut entity = VehicleBinarySensorEntity::new(
        vehicle,
        VehicleBinarySensor::new(description("vehicle_state_fd_window")),
        EntityOptions::from_config(&config, true),
    );
    assert_eq!(entity.handle_coordinator_update(), Reconciled::Unchanged);
    assert_eq!(entity.state().state.as_deref(), Some("on"));

    assert!(entity.handle_stream_update(&stream_field("FdWindow", json!("WindowStateClosed"), T0 + 500)));
    assert_eq!(entity.state().state.as_deref(), Some("off"));
    assert_eq!(entity.state().attribute("updated_by"), Some(&json!("streaming")));
}

#[tokio::test]
async fn stream_only_sensor_restores_and_streams() {
    let config = test_config();
    let (_, vehicle) = loaded_vehicle(VIN, flags(), &config).await;
    let mut entity = VehicleBinarySensorEntity::new(
        vehicle,
        VehicleBinarySensor::new(description("brake_pedal")),
        EntityOptions::from_config(&config, true),
    );
    assert_eq!(entity.unique_id(), format!("{}-brake_pedal", VIN));
    assert_eq!(entity.state().state, None);

    // Polling never carries this field
    entity.handle_coordinator_update();
    assert_eq!(entity.state().state, None);

    entity.restore(&EntityState::new(Some("on".to_string())));
    assert_eq!(entity.kind().is_on(), Some(true));

    assert!(entity.handle_stream_update(&stream_field("BrakePedal", json!("false"), T0 + 1_000)));
    assert_eq!(entity.state().state.as_deref(), Some("off"));
}

#[tokio::test]
async fn energy_flag_follows_live_status() {
    let config = test_config();
    let (api, site) = loaded_site(
        json!({"storm_mode_active": true, "grid_services_active": false}),
        json!({}),
        &config,
    )
    .await;
    let storm = ENERGY_BINARY_SENSORS
        .iter()
        .find(|d| d.key == "storm_mode_active")
        .unwrap();
    let mut entity = EnergyBinarySensorEntity::new(site.clone(), EnergyBinarySensor::new(storm), true);

    assert_eq!(entity.unique_id(), format!("{}-storm_mode_active", SITE_ID));
    assert_eq!(entity.state().state.as_deref(), Some("on"));

    api.set_default_live(json!({"storm_mode_active": false}));
    site.live_coordinator.refresh().await.unwrap();
    assert_eq!(entity.handle_coordinator_update(), Reconciled::Overwritten);
    assert_eq!(entity.state().state.as_deref(), Some("off"));
    assert_eq!(entity.handle_coordinator_update(), Reconciled::Unchanged);
}
