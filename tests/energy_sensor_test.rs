mod common;

use common::{SITE_ID, loaded_site, test_config};
use serde_json::json;
use teslemetry_bridge::coordinator::Coordinator;
use teslemetry_bridge::entity::{ENERGY_LIVE_DESCRIPTIONS, EnergySensorEntity, Entity, Reconciled};

#[tokio::test]
async fn energy_left_holds_through_small_drops() {
    let config = test_config();
    let (api, site) = loaded_site(json!({"energy_left": 12000}), json!({}), &config).await;
    let description = ENERGY_LIVE_DESCRIPTIONS
        .iter()
        .find(|d| d.key == "energy_left")
        .unwrap();
    let mut entity = EnergySensorEntity::live(site.clone(), description);
    assert_eq!(entity.unique_id(), format!("{}-energy_left", SITE_ID));
    assert_eq!(entity.state().state.as_deref(), Some("12000"));

    api.set_default_live(json!({"energy_left": 11999.5}));
    site.live_coordinator.refresh().await.unwrap();
    entity.handle_coordinator_update();
    assert_eq!(entity.state().state.as_deref(), Some("12000.0"));

    api.set_default_live(json!({"energy_left": 11000}));
    site.live_coordinator.refresh().await.unwrap();
    assert_eq!(entity.handle_coordinator_update(), Reconciled::Overwritten);
    assert_eq!(entity.state().state.as_deref(), Some("11000"));
}

#[tokio::test]
async fn unfiltered_power_follows_every_reading() {
    let config = test_config();
    let (api, site) = loaded_site(json!({"solar_power": 3000}), json!({}), &config).await;
    let description = ENERGY_LIVE_DESCRIPTIONS
        .iter()
        .find(|d| d.key == "solar_power")
        .unwrap();
    let mut entity = EnergySensorEntity::live(site.clone(), description);

    api.set_default_live(json!({"solar_power": 2999.5}));
    site.live_coordinator.refresh().await.unwrap();
    assert_eq!(entity.handle_coordinator_update(), Reconciled::Overwritten);
    assert_eq!(entity.state().state.as_deref(), Some("2999.5"));
    assert_eq!(entity.state().attribute("unit_of_measurement"), Some(&json!("W")));
}
