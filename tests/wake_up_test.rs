mod common;

use common::{MockVehicle, VIN, summary, test_config, vehicle_context};
use serde_json::json;
use std::time::Duration;
use teslemetry_bridge::BridgeError;
use teslemetry_bridge::api::{ApiError, VehicleState};
use teslemetry_bridge::config::WakeConfig;
use teslemetry_bridge::coordinator::Coordinator;
use teslemetry_bridge::entity::{DoorLock, DoorLockEntity, Entity, EntityCommand, EntityOptions};

fn asleep_product() -> serde_json::Value {
    json!({"vin": VIN, "state": "asleep"})
}

#[tokio::test(start_paused = true)]
async fn wake_up_polls_with_growing_backoff() {
    let config = test_config();
    let api = MockVehicle::new(VIN);
    api.push_wake(Ok(summary("asleep")));
    api.push_summary(Ok(summary("asleep")));
    api.push_summary(Ok(summary("online")));
    let vehicle = vehicle_context(api.clone(), asleep_product(), &config);

    let started = tokio::time::Instant::now();
    vehicle.wake_up(&config.wake).await.unwrap();

    assert_eq!(api.calls("wake_up"), 1);
    assert_eq!(api.calls("vehicle"), 2);
    assert_eq!(vehicle.coordinator.core().state(), VehicleState::Online);
    // 5s after the first attempt, 10s after the second
    assert!(started.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn wake_up_gives_up_after_max_attempts() {
    let config = test_config();
    let api = MockVehicle::new(VIN);
    api.push_wake(Ok(summary("asleep")));
    for _ in 0..5 {
        api.push_summary(Ok(summary("asleep")));
    }
    let vehicle = vehicle_context(api.clone(), asleep_product(), &config);

    let wake = WakeConfig {
        max_attempts: 3,
        backoff_step_secs: 5,
    };
    let err = vehicle.wake_up(&wake).await.unwrap_err();

    assert!(matches!(err, BridgeError::Command { .. }));
    assert!(err.to_string().contains("Could not wake up vehicle"));
    assert_eq!(api.calls("wake_up"), 1);
    assert_eq!(api.calls("vehicle"), 2);
}

#[tokio::test(start_paused = true)]
async fn wake_up_error_is_a_command_error() {
    let config = test_config();
    let api = MockVehicle::new(VIN);
    api.push_wake(Err(ApiError::InternalServerError));
    let vehicle = vehicle_context(api, asleep_product(), &config);

    let err = vehicle.wake_up(&config.wake).await.unwrap_err();
    assert!(matches!(err, BridgeError::Command { .. }));
}

#[tokio::test(start_paused = true)]
async fn online_vehicle_is_not_woken() {
    let config = test_config();
    let api = MockVehicle::new(VIN);
    let vehicle = vehicle_context(api.clone(), json!({"vin": VIN, "state": "online"}), &config);

    vehicle.wake_up(&config.wake).await.unwrap();
    assert_eq!(api.calls("wake_up"), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_commands_share_one_wake_up() {
    let config = test_config();
    let api = MockVehicle::new(VIN);
    api.push_wake(Ok(summary("asleep")));
    api.push_summary(Ok(summary("online")));
    let vehicle = vehicle_context(api.clone(), asleep_product(), &config);

    let (first, second) = tokio::join!(
        vehicle.wake_up(&config.wake),
        vehicle.wake_up(&config.wake)
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(api.calls("wake_up"), 1);
    assert_eq!(api.calls("vehicle"), 1);
}

#[tokio::test(start_paused = true)]
async fn command_wakes_sleeping_vehicle_first() {
    let config = test_config();
    let api = MockVehicle::new(VIN);
    let vehicle = vehicle_context(api.clone(), asleep_product(), &config);
    let mut entity =
        DoorLockEntity::new(vehicle, DoorLock::new(), EntityOptions::from_config(&config, true));

    entity
        .apply_command(EntityCommand::Lock { code: None })
        .await
        .unwrap();

    assert_eq!(api.calls("wake_up"), 1);
    assert_eq!(api.calls("command"), 1);
    assert_eq!(entity.state().state.as_deref(), Some("locked"));
}
