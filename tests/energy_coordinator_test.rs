mod common;

use common::{MockEnergySite, SITE_ID, test_config};
use serde_json::json;
use std::sync::Arc;
use teslemetry_bridge::BridgeError;
use teslemetry_bridge::api::ApiError;
use teslemetry_bridge::coordinator::{
    Coordinator, ENERGY_HISTORY_FIELDS, EnergyHistoryCoordinator, EnergyInfoCoordinator,
    EnergyLiveCoordinator,
};
use teslemetry_bridge::hub::{EVENT_LIVE_STATUS, EVENT_SITE_INFO, Hub};

#[tokio::test]
async fn live_status_keys_wall_connectors_by_din() {
    let api = MockEnergySite::new(SITE_ID);
    api.set_default_live(json!({
        "solar_power": 3200,
        "battery_power": -1500,
        "wall_connectors": [
            {"din": "1457768-02-G--PGT22", "wall_connector_state": 2, "wall_connector_power": 0},
            {"wall_connector_state": 4}
        ]
    }));
    let hub = Arc::new(Hub::new());
    let mut events = hub.subscribe_events();
    let coordinator = EnergyLiveCoordinator::new(api, hub, &test_config());

    coordinator.refresh().await.unwrap();

    assert_eq!(coordinator.core().get("solar_power"), Some(json!(3200)));
    let connector = coordinator.wall_connector("1457768-02-G--PGT22").unwrap();
    assert_eq!(connector["wall_connector_state"], json!(2));
    assert_eq!(
        coordinator
            .core()
            .get("wall_connectors")
            .and_then(|w| w.as_object().map(|m| m.len())),
        Some(1)
    );

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, EVENT_LIVE_STATUS);
    assert!(event.data["wall_connectors"].is_array());
}

#[tokio::test]
async fn live_status_without_connectors_has_empty_map() {
    let api = MockEnergySite::new(SITE_ID);
    api.set_default_live(json!({"solar_power": 0}));
    let coordinator = EnergyLiveCoordinator::new(api, Arc::new(Hub::new()), &test_config());

    coordinator.refresh().await.unwrap();
    assert_eq!(coordinator.core().get("wall_connectors"), Some(json!({})));
}

#[tokio::test]
async fn live_status_escalates_after_repeated_server_errors() {
    let api = MockEnergySite::new(SITE_ID);
    api.push_live(Ok(json!({"response": {"solar_power": 100}})));
    for _ in 0..3 {
        api.push_live(Err(ApiError::ServiceUnavailable));
    }
    let coordinator = EnergyLiveCoordinator::new(api, Arc::new(Hub::new()), &test_config());

    coordinator.refresh().await.unwrap();
    coordinator.refresh().await.unwrap();
    coordinator.refresh().await.unwrap();
    assert_eq!(coordinator.core().get("solar_power"), Some(json!(100)));

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, BridgeError::UpdateFailed { .. }));
    assert!(!coordinator.core().last_update_success());
}

#[tokio::test]
async fn subscription_problem_raises_issue_for_site() {
    let api = MockEnergySite::new(SITE_ID);
    api.push_live(Err(ApiError::SubscriptionRequired));
    let hub = Arc::new(Hub::new());
    let coordinator = EnergyLiveCoordinator::new(api, hub.clone(), &test_config());

    assert!(coordinator.refresh().await.is_err());
    let issue = hub
        .issues()
        .get("teslemetry", &SITE_ID.to_string())
        .unwrap();
    assert_eq!(issue.translation_key, "subscription_required");
}

#[tokio::test]
async fn site_info_starts_from_product_and_flattens() {
    let api = MockEnergySite::new(SITE_ID);
    api.set_default_info(json!({
        "site_name": "Home",
        "version": "24.4.0",
        "components": {"battery": true, "solar": true}
    }));
    let product = json!({"energy_site_id": SITE_ID, "site_name": "Home", "components": {"battery": true}});
    let hub = Arc::new(Hub::new());
    let mut events = hub.subscribe_events();
    let coordinator = EnergyInfoCoordinator::new(api, &product, hub, &test_config());

    assert_eq!(coordinator.core().get("components_battery"), Some(json!(true)));

    coordinator.refresh().await.unwrap();
    assert_eq!(coordinator.core().get("version"), Some(json!("24.4.0")));
    assert_eq!(coordinator.core().get("components_solar"), Some(json!(true)));
    assert_eq!(events.try_recv().unwrap().event_type, EVENT_SITE_INFO);
}

#[tokio::test]
async fn history_sums_todays_buckets() {
    let api = MockEnergySite::new(SITE_ID);
    api.push_history(Ok(json!({"response": {"time_series": [
        {"solar_energy_exported": 1200.5, "total_home_usage": 800},
        {"solar_energy_exported": 300, "total_home_usage": 200.25, "grid_energy_imported": 50}
    ]}})));
    let coordinator = EnergyHistoryCoordinator::new(api, Arc::new(Hub::new()), &test_config());

    assert_eq!(
        coordinator.core().get("solar_energy_exported"),
        Some(json!(0.0))
    );

    coordinator.refresh().await.unwrap();
    let data = coordinator.core().data();
    assert_eq!(data.len(), ENERGY_HISTORY_FIELDS.len());
    assert_eq!(data["solar_energy_exported"], json!(1500.5));
    assert_eq!(data["total_home_usage"], json!(1000.25));
    assert_eq!(data["grid_energy_imported"], json!(50.0));
    assert_eq!(data["battery_energy_exported"], json!(0.0));
}

#[tokio::test]
async fn history_invalid_token_is_auth_failure() {
    let api = MockEnergySite::new(SITE_ID);
    api.push_history(Err(ApiError::InvalidToken));
    let hub = Arc::new(Hub::new());
    let coordinator = EnergyHistoryCoordinator::new(api, hub.clone(), &test_config());

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, BridgeError::Auth { .. }));
    assert!(hub.reauth_requested());
}
