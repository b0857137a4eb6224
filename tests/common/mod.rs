#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use teslemetry_bridge::api::{
    ApiError, ApiResult, EnergyApi, EnergyCommand, Metadata, Scope, TeslemetryApi, VehicleApi,
    VehicleCommand, VehicleDataEndpoint,
};
use teslemetry_bridge::config::Config;
use teslemetry_bridge::coordinator::{
    Coordinator, EnergyInfoCoordinator, EnergyLiveCoordinator, VehicleDataCoordinator,
};
use teslemetry_bridge::hub::Hub;
use teslemetry_bridge::models::{DeviceInfo, EnergySiteContext, VehicleContext};
use teslemetry_bridge::stream::StreamChannel;

pub const VIN: &str = "LRW3F7EK4NC000001";
/// 2017 Model S
pub const PRE2021_VIN: &str = "5YJSA1E26HF000001";
pub const SITE_ID: u64 = 123_456;

pub fn summary(state: &str) -> Value {
    json!({"response": {"state": state}})
}

pub fn accepted() -> Value {
    json!({"response": {"result": true, "reason": ""}})
}

fn pop(queue: &Mutex<VecDeque<ApiResult<Value>>>, fallback: Value) -> ApiResult<Value> {
    queue.lock().unwrap().pop_front().unwrap_or(Ok(fallback))
}

/// Scripted vehicle endpoint; empty queues answer online with `data`
pub struct MockVehicle {
    vin: String,
    summaries: Mutex<VecDeque<ApiResult<Value>>>,
    data: Mutex<VecDeque<ApiResult<Value>>>,
    wakes: Mutex<VecDeque<ApiResult<Value>>>,
    default_data: Mutex<Value>,
    command_result: Mutex<ApiResult<Value>>,
    command_results: Mutex<VecDeque<ApiResult<Value>>>,
    commands: Mutex<Vec<VehicleCommand>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockVehicle {
    pub fn new(vin: &str) -> Arc<Self> {
        Arc::new(Self {
            vin: vin.to_string(),
            summaries: Mutex::new(VecDeque::new()),
            data: Mutex::new(VecDeque::new()),
            wakes: Mutex::new(VecDeque::new()),
            default_data: Mutex::new(json!({"response": {"vin": vin, "state": "online"}})),
            command_result: Mutex::new(Ok(accepted())),
            command_results: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push_summary(&self, result: ApiResult<Value>) {
        self.summaries.lock().unwrap().push_back(result);
    }

    pub fn push_data(&self, result: ApiResult<Value>) {
        self.data.lock().unwrap().push_back(result);
    }

    pub fn push_wake(&self, result: ApiResult<Value>) {
        self.wakes.lock().unwrap().push_back(result);
    }

    pub fn set_default_data(&self, response: Value) {
        *self.default_data.lock().unwrap() = json!({ "response": response });
    }

    pub fn set_command_result(&self, result: ApiResult<Value>) {
        *self.command_result.lock().unwrap() = result;
    }

    /// One-shot answer for the next command, ahead of `set_command_result`
    pub fn push_command_result(&self, result: ApiResult<Value>) {
        self.command_results.lock().unwrap().push_back(result);
    }

    pub fn commands(&self) -> Vec<VehicleCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

#[async_trait]
impl VehicleApi for MockVehicle {
    fn vin(&self) -> &str {
        &self.vin
    }

    async fn vehicle(&self) -> ApiResult<Value> {
        self.record("vehicle");
        pop(&self.summaries, summary("online"))
    }

    async fn vehicle_data(&self, _endpoints: &[VehicleDataEndpoint]) -> ApiResult<Value> {
        self.record("vehicle_data");
        let fallback = self.default_data.lock().unwrap().clone();
        pop(&self.data, fallback)
    }

    async fn wake_up(&self) -> ApiResult<Value> {
        self.record("wake_up");
        pop(&self.wakes, summary("online"))
    }

    async fn command(&self, command: VehicleCommand) -> ApiResult<Value> {
        self.record("command");
        self.commands.lock().unwrap().push(command);
        let fallback = self.command_result.lock().unwrap().clone();
        self.command_results.lock().unwrap().pop_front().unwrap_or(fallback)
    }
}

/// Scripted energy site endpoints
pub struct MockEnergySite {
    id: u64,
    live: Mutex<VecDeque<ApiResult<Value>>>,
    info: Mutex<VecDeque<ApiResult<Value>>>,
    history: Mutex<VecDeque<ApiResult<Value>>>,
    default_live: Mutex<Value>,
    default_info: Mutex<Value>,
    commands: Mutex<Vec<EnergyCommand>>,
}

impl MockEnergySite {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            live: Mutex::new(VecDeque::new()),
            info: Mutex::new(VecDeque::new()),
            history: Mutex::new(VecDeque::new()),
            default_live: Mutex::new(json!({"response": {}})),
            default_info: Mutex::new(json!({"response": {}})),
            commands: Mutex::new(Vec::new()),
        })
    }

    pub fn push_live(&self, result: ApiResult<Value>) {
        self.live.lock().unwrap().push_back(result);
    }

    pub fn push_info(&self, result: ApiResult<Value>) {
        self.info.lock().unwrap().push_back(result);
    }

    pub fn push_history(&self, result: ApiResult<Value>) {
        self.history.lock().unwrap().push_back(result);
    }

    pub fn set_default_live(&self, response: Value) {
        *self.default_live.lock().unwrap() = json!({ "response": response });
    }

    pub fn set_default_info(&self, response: Value) {
        *self.default_info.lock().unwrap() = json!({ "response": response });
    }

    pub fn commands(&self) -> Vec<EnergyCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnergyApi for MockEnergySite {
    fn energy_site_id(&self) -> u64 {
        self.id
    }

    async fn live_status(&self) -> ApiResult<Value> {
        let fallback = self.default_live.lock().unwrap().clone();
        pop(&self.live, fallback)
    }

    async fn site_info(&self) -> ApiResult<Value> {
        let fallback = self.default_info.lock().unwrap().clone();
        pop(&self.info, fallback)
    }

    async fn energy_history(&self) -> ApiResult<Value> {
        pop(&self.history, json!({"response": {"time_series": []}}))
    }

    async fn command(&self, command: EnergyCommand) -> ApiResult<Value> {
        self.commands.lock().unwrap().push(command);
        Ok(json!({"response": {"code": 201, "message": "Updated"}}))
    }
}

/// Account with scripted metadata, products and test results
pub struct MockAccount {
    pub metadata: Mutex<ApiResult<Metadata>>,
    pub products: Mutex<ApiResult<Value>>,
    pub test: Mutex<ApiResult<Value>>,
    vehicles: Mutex<HashMap<String, Arc<MockVehicle>>>,
    sites: Mutex<HashMap<u64, Arc<MockEnergySite>>>,
}

impl MockAccount {
    pub fn new(scopes: &[Scope], products: Value) -> Arc<Self> {
        Arc::new(Self {
            metadata: Mutex::new(Ok(Metadata {
                uid: "uid-1".to_string(),
                scopes: scopes.to_vec(),
                region: "NA".to_string(),
            })),
            products: Mutex::new(Ok(json!({ "response": products }))),
            test: Mutex::new(Ok(json!({"response": true}))),
            vehicles: Mutex::new(HashMap::new()),
            sites: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_metadata_error(&self, err: ApiError) {
        *self.metadata.lock().unwrap() = Err(err);
    }

    pub fn set_test(&self, result: ApiResult<Value>) {
        *self.test.lock().unwrap() = result;
    }

    pub fn mock_vehicle(&self, vin: &str) -> Arc<MockVehicle> {
        self.vehicles
            .lock()
            .unwrap()
            .entry(vin.to_string())
            .or_insert_with(|| MockVehicle::new(vin))
            .clone()
    }

    pub fn mock_site(&self, id: u64) -> Arc<MockEnergySite> {
        self.sites
            .lock()
            .unwrap()
            .entry(id)
            .or_insert_with(|| MockEnergySite::new(id))
            .clone()
    }
}

#[async_trait]
impl TeslemetryApi for MockAccount {
    async fn metadata(&self) -> ApiResult<Metadata> {
        self.metadata.lock().unwrap().clone()
    }

    async fn products(&self) -> ApiResult<Value> {
        self.products.lock().unwrap().clone()
    }

    async fn test(&self) -> ApiResult<Value> {
        self.test.lock().unwrap().clone()
    }

    fn vehicle(&self, vin: &str) -> Arc<dyn VehicleApi> {
        self.mock_vehicle(vin)
    }

    fn energy_site(&self, energy_site_id: u64) -> Arc<dyn EnergyApi> {
        self.mock_site(energy_site_id)
    }
}

pub fn all_scopes() -> Vec<Scope> {
    vec![
        Scope::OpenId,
        Scope::OfflineAccess,
        Scope::UserData,
        Scope::VehicleDeviceData,
        Scope::VehicleCmds,
        Scope::EnergyDeviceData,
        Scope::EnergyCmds,
    ]
}

/// Config without file logging or persistence side effects
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.streaming.enabled = false;
    config
}

/// A vehicle context whose coordinator starts from `product`
pub fn vehicle_context(api: Arc<MockVehicle>, product: Value, config: &Config) -> Arc<VehicleContext> {
    let hub = Arc::new(Hub::new());
    let coordinator = Arc::new(VehicleDataCoordinator::new(api.clone(), &product, hub, config));
    let vin = api.vin.clone();
    Arc::new(VehicleContext::new(
        api,
        coordinator,
        Arc::new(StreamChannel::new(None)),
        DeviceInfo::vehicle(&vin, "Test Car"),
    ))
}

/// A vehicle that answered one full poll with `data`
pub async fn loaded_vehicle(
    vin: &str,
    mut data: Value,
    config: &Config,
) -> (Arc<MockVehicle>, Arc<VehicleContext>) {
    if let Some(obj) = data.as_object_mut() {
        obj.entry("state").or_insert_with(|| json!("online"));
    }
    let api = MockVehicle::new(vin);
    api.set_default_data(data);
    let context = vehicle_context(api.clone(), json!({"vin": vin, "state": "online"}), config);
    context.coordinator.refresh().await.unwrap();
    (api, context)
}

/// An energy site whose live and info coordinators answered once
pub async fn loaded_site(
    live: Value,
    info: Value,
    config: &Config,
) -> (Arc<MockEnergySite>, Arc<EnergySiteContext>) {
    let api = MockEnergySite::new(SITE_ID);
    api.set_default_live(live);
    api.set_default_info(info);
    let hub = Arc::new(Hub::new());
    let site = EnergySiteContext {
        api: api.clone(),
        live_coordinator: Arc::new(EnergyLiveCoordinator::new(api.clone(), hub.clone(), config)),
        info_coordinator: Arc::new(EnergyInfoCoordinator::new(
            api.clone(),
            &json!({"energy_site_id": SITE_ID}),
            hub,
            config,
        )),
        history_coordinator: None,
        id: SITE_ID,
        device: DeviceInfo::energy_site(SITE_ID, "Home"),
    };
    site.live_coordinator.refresh().await.unwrap();
    site.info_coordinator.refresh().await.unwrap();
    (api, Arc::new(site))
}
