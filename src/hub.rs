//! Host platform surface
//!
//! The home-automation host owns the event bus, the issue registry and the
//! entity state machine. `Hub` is the narrow in-process stand-in that the
//! bridge writes to; a host adapter subscribes to its channels.

use crate::entity::EntityState;
use crate::logging::get_logger;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Integration domain used for issues and events
pub const DOMAIN: &str = "teslemetry";

pub const EVENT_VEHICLE_DATA: &str = "teslemetry_vehicle_data";
pub const EVENT_LIVE_STATUS: &str = "teslemetry_live_status";
pub const EVENT_SITE_INFO: &str = "teslemetry_site_info";
pub const EVENT_ALERT: &str = "teslemetry_alert";
pub const EVENT_ERROR: &str = "teslemetry_error";

const CHANNEL_CAPACITY: usize = 256;

/// Raw payload broadcast for external consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    pub event_type: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Error,
    Critical,
}

/// Persistent problem notification shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub domain: String,
    pub issue_id: String,
    pub is_fixable: bool,
    pub severity: IssueSeverity,
    pub translation_key: String,
}

/// Issues keyed by domain and issue id; creating an existing key replaces it
#[derive(Debug, Default)]
pub struct IssueRegistry {
    issues: Mutex<BTreeMap<(String, String), Issue>>,
}

impl IssueRegistry {
    pub fn create(&self, issue: Issue) {
        let key = (issue.domain.clone(), issue.issue_id.clone());
        self.lock().insert(key, issue);
    }

    pub fn delete(&self, domain: &str, issue_id: &str) -> Option<Issue> {
        self.lock()
            .remove(&(domain.to_string(), issue_id.to_string()))
    }

    pub fn get(&self, domain: &str, issue_id: &str) -> Option<Issue> {
        self.lock()
            .get(&(domain.to_string(), issue_id.to_string()))
            .cloned()
    }

    pub fn list(&self) -> Vec<Issue> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Issue>> {
        self.issues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A published entity state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub entity_id: String,
    pub state: EntityState,
}

/// Event bus, issue registry and entity state machine of the host
pub struct Hub {
    events: broadcast::Sender<DomainEvent>,
    states: broadcast::Sender<StateChange>,
    last_states: Mutex<HashMap<String, EntityState>>,
    issues: IssueRegistry,
    reauth: AtomicBool,
    reload: AtomicBool,
}

impl Hub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (states, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            events,
            states,
            last_states: Mutex::new(HashMap::new()),
            issues: IssueRegistry::default(),
            reauth: AtomicBool::new(false),
            reload: AtomicBool::new(false),
        }
    }

    /// Broadcast a domain event; having no listeners is fine
    pub fn fire(&self, event_type: &str, data: Value) {
        let _ = self.events.send(DomainEvent {
            event_type: event_type.to_string(),
            data,
        });
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    pub fn issues(&self) -> &IssueRegistry {
        &self.issues
    }

    /// Write an entity state; returns false when it equals the last one
    pub fn publish_state(&self, entity_id: &str, state: EntityState) -> bool {
        {
            let mut last = self
                .last_states
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.get(entity_id) == Some(&state) {
                return false;
            }
            last.insert(entity_id.to_string(), state.clone());
        }
        let _ = self.states.send(StateChange {
            entity_id: entity_id.to_string(),
            state,
        });
        true
    }

    pub fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.last_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    /// All last published states, for persistence
    pub fn states(&self) -> HashMap<String, EntityState> {
        self.last_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe_states(&self) -> broadcast::Receiver<StateChange> {
        self.states.subscribe()
    }

    /// Flag the config entry for re-authorization
    pub fn request_reauth(&self) {
        if !self.reauth.swap(true, Ordering::SeqCst) {
            get_logger("hub").warn("Credentials rejected, re-authorization required");
        }
    }

    pub fn reauth_requested(&self) -> bool {
        self.reauth.load(Ordering::SeqCst)
    }

    /// Flag the config entry for reload
    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    /// Take the pending reload flag
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(id: &str) -> Issue {
        Issue {
            domain: DOMAIN.to_string(),
            issue_id: id.to_string(),
            is_fixable: false,
            severity: IssueSeverity::Error,
            translation_key: "subscription_required".to_string(),
        }
    }

    #[test]
    fn test_issue_registry_replaces_same_key() {
        let hub = Hub::new();
        hub.issues().create(issue("VIN1"));
        hub.issues().create(issue("VIN1"));
        hub.issues().create(issue("VIN2"));
        assert_eq!(hub.issues().list().len(), 2);
        assert!(hub.issues().delete(DOMAIN, "VIN1").is_some());
        assert!(hub.issues().get(DOMAIN, "VIN1").is_none());
    }

    #[tokio::test]
    async fn test_publish_state_skips_duplicates() {
        let hub = Hub::new();
        let mut rx = hub.subscribe_states();
        let state = EntityState::new(Some("locked".to_string()));
        assert!(hub.publish_state("lock.vin1_lock", state.clone()));
        assert!(!hub.publish_state("lock.vin1_lock", state.clone()));
        let change = rx.recv().await.unwrap();
        assert_eq!(change.entity_id, "lock.vin1_lock");
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.state("lock.vin1_lock"), Some(state));
    }

    #[tokio::test]
    async fn test_fire_reaches_subscribers() {
        let hub = Hub::new();
        let mut rx = hub.subscribe_events();
        hub.fire(EVENT_SITE_INFO, json!({"id": 1}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EVENT_SITE_INFO);
        assert_eq!(event.data, json!({"id": 1}));
    }

    #[test]
    fn test_flags() {
        let hub = Hub::new();
        assert!(!hub.reauth_requested());
        hub.request_reauth();
        hub.request_reauth();
        assert!(hub.reauth_requested());
        hub.request_reload();
        assert!(hub.take_reload());
        assert!(!hub.take_reload());
    }
}
