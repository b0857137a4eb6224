#![no_main]
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    // Only well-formed JSON reaches the coordinators
    let Ok(value) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let _ = teslemetry_bridge::helpers::flatten_value(&value);
    let _ = teslemetry_bridge::helpers::handle_vehicle_command(&value);
    let _ = teslemetry_bridge::coordinator::normalize_wall_connectors(Some(&value));
    if let Value::Object(map) = &value {
        let _ = teslemetry_bridge::coordinator::sum_history(map);
    }
    if let Value::String(raw) = &value {
        let _ = teslemetry_bridge::helpers::auto_type(raw);
    }
});
