//! Data shaping helpers shared by coordinators and entities

use crate::api::ApiError;
use crate::error::{BridgeError, Result};
use crate::logging::get_logger;
use serde_json::{Map, Number, Value};

/// Flat field map published by coordinators
pub type Snapshot = Map<String, Value>;

/// Command reasons that mean the vehicle is already where we want it
const ACCEPTED_REASONS: [&str; 3] = ["already_set", "not_charging", "requested"];

/// Flatten nested objects into one map, joining keys with `_`
///
/// `{"charge_state": {"battery_level": 80}}` becomes
/// `{"charge_state_battery_level": 80}`. Arrays and scalars are kept as-is.
pub fn flatten(data: &Map<String, Value>) -> Snapshot {
    let mut result = Snapshot::new();
    flatten_into(&mut result, data, None);
    result
}

fn flatten_into(result: &mut Snapshot, data: &Map<String, Value>, parent: Option<&str>) {
    for (key, value) in data {
        let key = match parent {
            Some(parent) => format!("{}_{}", parent, key),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_into(result, nested, Some(&key)),
            other => {
                result.insert(key, other.clone());
            }
        }
    }
}

/// Flatten a response body; anything other than an object yields an empty map
pub fn flatten_value(value: &Value) -> Snapshot {
    match value {
        Value::Object(map) => flatten(map),
        _ => Snapshot::new(),
    }
}

/// The object inside a value, or an empty map
pub fn object_or_empty(value: Option<&Value>) -> Snapshot {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Snapshot::new(),
    }
}

/// Whether a value counts as set: not null, false, zero or empty
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Convert a textual stream value to the most specific JSON type
pub fn auto_type(raw: &str) -> Value {
    if !raw.is_empty()
        && raw.chars().all(|c| c.is_ascii_digit())
        && let Ok(int) = raw.parse::<u64>()
    {
        return Value::Number(int.into());
    }
    if let Ok(float) = raw.trim().parse::<f64>()
        && let Some(number) = Number::from_f64(float)
    {
        return Value::Number(number);
    }
    match raw.to_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Filter that holds its last value through small drops
///
/// Used for slowly decreasing counters (energy remaining, range) which
/// jitter downwards between reports.
#[derive(Debug, Clone)]
pub struct IgnoreDrop {
    change: f64,
    last: Option<f64>,
}

impl IgnoreDrop {
    pub fn new(change: f64) -> Self {
        Self { change, last: None }
    }

    /// Feed a new reading; non-numeric input returns `None`
    pub fn apply(&mut self, value: &Value) -> Option<f64> {
        let value = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        match self.last {
            Some(last) if value <= last && last - value <= self.change => {}
            _ => self.last = Some(value),
        }
        self.last
    }

    /// Pass an accepted reading through unchanged, otherwise the held value
    pub fn filter(&mut self, value: Value) -> Value {
        match self.apply(&value) {
            Some(held) if crate::entity::as_f64(&value) != Some(held) => Value::from(held),
            _ => value,
        }
    }
}

/// Wrap a vendor failure raised while sending a command
pub fn command_failed(err: &ApiError) -> BridgeError {
    BridgeError::command(format!("Teslemetry command failed, {}", err.message()))
}

/// Validate the body returned by a vehicle command
///
/// Returns the `result` member on acceptance.
pub fn handle_vehicle_command(body: &Value) -> Result<Value> {
    get_logger("command").debug(&format!("Command result: {}", body));

    let response = match body.get("response") {
        Some(response) if !response.is_null() => response,
        _ => {
            if let Some(error) = body.get("error").and_then(Value::as_str)
                && !error.is_empty()
            {
                return Err(BridgeError::command(error));
            }
            return Err(BridgeError::command(format!("Unknown response: {}", body)));
        }
    };

    let result = response.get("result").cloned().unwrap_or(Value::Null);
    if result == Value::Bool(true) {
        return Ok(result);
    }
    match response.get("reason").and_then(Value::as_str) {
        Some(reason) if ACCEPTED_REASONS.contains(&reason) => Ok(result),
        Some(reason) if !reason.is_empty() => Err(BridgeError::command(reason)),
        _ => Err(BridgeError::command("Command failed with no reason")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested() {
        let data = json!({
            "state": "online",
            "charge_state": {"battery_level": 80, "timestamp": 1},
            "vehicle_state": {"media_info": {"a2dp_source_name": "Phone"}},
            "tags": ["x"]
        });
        let flat = flatten_value(&data);
        assert_eq!(flat["state"], json!("online"));
        assert_eq!(flat["charge_state_battery_level"], json!(80));
        assert_eq!(
            flat["vehicle_state_media_info_a2dp_source_name"],
            json!("Phone")
        );
        assert_eq!(flat["tags"], json!(["x"]));
        assert!(!flat.contains_key("charge_state"));
    }

    #[test]
    fn test_flatten_non_object_is_empty() {
        assert!(flatten_value(&json!([1, 2])).is_empty());
        assert!(flatten_value(&Value::Null).is_empty());
        assert!(flatten_value(&json!("text")).is_empty());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&Value::Null)));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("Charging"))));
    }

    #[test]
    fn test_auto_type() {
        assert_eq!(auto_type("42"), json!(42));
        assert_eq!(auto_type("-1.5"), json!(-1.5));
        assert_eq!(auto_type("TRUE"), json!(true));
        assert_eq!(auto_type("false"), json!(false));
        assert_eq!(auto_type("ShiftStateP"), json!("ShiftStateP"));
        assert_eq!(auto_type(""), json!(""));
    }

    #[test]
    fn test_ignore_drop_holds_small_drops() {
        let mut filter = IgnoreDrop::new(1.0);
        assert_eq!(filter.apply(&json!(50.0)), Some(50.0));
        assert_eq!(filter.apply(&json!(49.5)), Some(50.0));
        assert_eq!(filter.apply(&json!("51")), Some(51.0));
        assert_eq!(filter.apply(&json!(45)), Some(45.0));
        assert_eq!(filter.apply(&json!("n/a")), None);
        assert_eq!(filter.apply(&json!(44.5)), Some(45.0));
    }

    #[test]
    fn test_ignore_drop_filter_keeps_json_form() {
        let mut filter = IgnoreDrop::new(1.0);
        assert_eq!(filter.filter(json!(12000)), json!(12000));
        assert_eq!(filter.filter(json!(11999.5)), json!(12000.0));
        assert_eq!(filter.filter(json!("n/a")), json!("n/a"));
        assert_eq!(filter.filter(json!(11000)), json!(11000));
    }

    #[test]
    fn test_vehicle_command_accepted() {
        let ok = json!({"response": {"result": true, "reason": ""}});
        assert_eq!(handle_vehicle_command(&ok).unwrap(), json!(true));

        let already = json!({"response": {"result": false, "reason": "already_set"}});
        assert_eq!(handle_vehicle_command(&already).unwrap(), json!(false));
    }

    #[test]
    fn test_vehicle_command_rejected() {
        let err = handle_vehicle_command(&json!({"response": {"result": false, "reason": "cabin comfort remote settings not enabled"}}))
            .unwrap_err();
        assert!(err.to_string().contains("cabin comfort"));

        let err =
            handle_vehicle_command(&json!({"response": {"result": false}})).unwrap_err();
        assert!(err.to_string().contains("Command failed with no reason"));

        let err = handle_vehicle_command(&json!({"error": "vehicle unavailable"})).unwrap_err();
        assert!(err.to_string().contains("vehicle unavailable"));

        let err = handle_vehicle_command(&json!({})).unwrap_err();
        assert!(err.to_string().contains("Unknown response"));
    }

    #[test]
    fn test_command_failed_message() {
        let err = command_failed(&ApiError::other("timeout", "Vehicle did not respond"));
        assert_eq!(
            err.to_string(),
            "Command error: Teslemetry command failed, Vehicle did not respond"
        );
    }
}
