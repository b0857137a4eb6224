use super::{Entity, EntityCommand, EntityState, Platform, Reconciled, UpdateType, as_f64};
use crate::api::{Scope, VehicleCommand};
use crate::config::{Config, WakeConfig};
use crate::coordinator::Coordinator;
use crate::error::{BridgeError, Result};
use crate::helpers::{command_failed, handle_vehicle_command};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::models::VehicleContext;
use crate::stream::StreamMessage;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Construction options shared by all vehicle entities
#[derive(Debug, Clone)]
pub struct EntityOptions {
    /// Whether the token holds the scope this entity's commands need
    pub scoped: bool,
    pub wake: WakeConfig,
    /// How much newer (ms) a polled value must be to replace a streamed one
    pub streaming_gap_ms: i64,
}

impl EntityOptions {
    pub fn from_config(config: &Config, scoped: bool) -> Self {
        Self {
            scoped,
            wake: config.wake.clone(),
            streaming_gap_ms: config.streaming.gap_ms,
        }
    }
}

/// Shared plumbing of every vehicle entity
pub struct VehicleEntityBase {
    vehicle: Arc<VehicleContext>,
    key: String,
    unique_id: String,
    timestamp_key: Option<&'static str>,
    streaming_key: Option<&'static str>,
    required_scopes: &'static [Scope],
    options: EntityOptions,
    updated_by: UpdateType,
    updated_at: i64,
    logger: StructuredLogger,
}

impl VehicleEntityBase {
    pub fn vehicle(&self) -> &Arc<VehicleContext> {
        &self.vehicle
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn scoped(&self) -> bool {
        self.options.scoped
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Value of any snapshot field
    pub fn get(&self, key: &str) -> Option<Value> {
        self.vehicle.coordinator.core().get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).as_ref().and_then(as_f64)
    }

    /// Value of this entity's own field
    pub fn value(&self) -> Option<Value> {
        self.get(&self.key)
    }

    pub fn updated_once(&self) -> bool {
        self.vehicle.coordinator.core().updated_once()
    }

    pub fn updated_by(&self) -> UpdateType {
        self.updated_by
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Fail when the token lacks the scope for commands
    pub fn raise_for_scope(&self) -> Result<()> {
        if self.options.scoped {
            return Ok(());
        }
        let names: Vec<&str> = self.required_scopes.iter().map(Scope::as_str).collect();
        Err(BridgeError::missing_scope(&names))
    }

    pub async fn wake_up_if_asleep(&self) -> Result<()> {
        self.vehicle.wake_up(&self.options.wake).await
    }

    /// Send a command and validate the vehicle's answer
    pub async fn handle_command(&self, command: VehicleCommand) -> Result<Value> {
        self.logger
            .debug(&format!("Sending command {}", command.endpoint()));
        let body = self
            .vehicle
            .api
            .command(command)
            .await
            .map_err(|e| command_failed(&e))?;
        handle_vehicle_command(&body)
    }

    /// Scope check, wake-up and command in one go
    pub async fn send(&self, command: VehicleCommand) -> Result<Value> {
        self.raise_for_scope()?;
        self.wake_up_if_asleep().await?;
        self.handle_command(command).await
    }

    /// Decide whether a polled value with `timestamp` may replace the current one
    ///
    /// Accepted when it is newer and the current value did not come from the
    /// stream, or when it is newer than the streamed value by more than the
    /// streaming gap.
    fn accept_poll(&mut self, timestamp: i64) -> bool {
        let newer = self.updated_by != UpdateType::Streaming && timestamp > self.updated_at;
        let past_gap = timestamp > self.updated_at.saturating_add(self.options.streaming_gap_ms);
        if newer || past_gap {
            self.updated_by = UpdateType::Polling;
            self.updated_at = timestamp;
            true
        } else {
            false
        }
    }

    fn poll_timestamp(&self) -> i64 {
        self.timestamp_key
            .and_then(|key| self.get(key))
            .and_then(|v| v.as_i64())
            .filter(|ts| *ts != 0)
            .unwrap_or_else(|| Utc::now().timestamp_millis())
    }

    fn mark_streamed(&mut self, timestamp: i64) {
        self.updated_by = UpdateType::Streaming;
        self.updated_at = timestamp;
    }

    fn decorate(&self, mut state: EntityState) -> EntityState {
        state.available = state.available && self.vehicle.coordinator.core().last_update_success();
        if self.updated_by != UpdateType::None {
            state
                .attributes
                .insert("updated_by".to_string(), self.updated_by.as_str().into());
            let at = Utc
                .timestamp_millis_opt(self.updated_at)
                .single()
                .map(|t| Value::String(t.to_rfc3339()))
                .unwrap_or(Value::Null);
            state.attributes.insert("updated_at".to_string(), at);
        }
        state
    }
}

/// Behaviour of one vehicle entity kind
#[async_trait]
pub trait VehicleEntityKind: Send + Sync {
    fn platform(&self) -> Platform;

    /// Snapshot field the entity is named after
    fn key(&self) -> &str;

    fn timestamp_key(&self) -> Option<&'static str> {
        None
    }

    fn streaming_key(&self) -> Option<&'static str> {
        None
    }

    fn required_scopes(&self) -> &'static [Scope] {
        &[Scope::VehicleCmds]
    }

    /// One-off setup once the base exists
    fn attach(&mut self, _base: &VehicleEntityBase) {}

    fn read_from_snapshot(&mut self, base: &VehicleEntityBase);

    fn read_from_stream(&mut self, _value: &Value) {}

    async fn apply_command(
        &mut self,
        _base: &VehicleEntityBase,
        command: EntityCommand,
    ) -> Result<()> {
        Err(command.unsupported())
    }

    /// Current value, without polling/streaming metadata
    fn value(&self) -> EntityState;

    fn restore(&mut self, _base: &VehicleEntityBase, _saved: &EntityState) {}
}

/// A vehicle entity: shared base plus one kind
pub struct VehicleEntity<K: VehicleEntityKind> {
    base: VehicleEntityBase,
    kind: K,
}

impl<K: VehicleEntityKind> VehicleEntity<K> {
    pub fn new(vehicle: Arc<VehicleContext>, mut kind: K, options: EntityOptions) -> Self {
        let key = kind.key().to_string();
        let logger = get_logger_with_context(
            LogContext::new(kind.platform().as_str())
                .with_vin(&vehicle.vin)
                .with_field("key", key.clone()),
        );
        let base = VehicleEntityBase {
            unique_id: format!("{}-{}", vehicle.vin, key),
            timestamp_key: kind.timestamp_key(),
            streaming_key: kind.streaming_key(),
            required_scopes: kind.required_scopes(),
            vehicle,
            key,
            options,
            updated_by: UpdateType::None,
            updated_at: 0,
            logger,
        };
        kind.attach(&base);
        if base.updated_once() || base.key == "state" {
            kind.read_from_snapshot(&base);
        }
        Self { base, kind }
    }

    pub fn base(&self) -> &VehicleEntityBase {
        &self.base
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }
}

#[async_trait]
impl<K: VehicleEntityKind> Entity for VehicleEntity<K> {
    fn unique_id(&self) -> &str {
        &self.base.unique_id
    }

    fn platform(&self) -> Platform {
        self.kind.platform()
    }

    fn vin(&self) -> Option<&str> {
        Some(&self.base.vehicle.vin)
    }

    fn streaming_key(&self) -> Option<&str> {
        self.base.streaming_key
    }

    fn state(&self) -> EntityState {
        self.base.decorate(self.kind.value())
    }

    fn write_state(&self) -> bool {
        self.base
            .vehicle
            .hub()
            .publish_state(&self.base.unique_id, self.state())
    }

    fn coordinator_updates(&self) -> watch::Receiver<u64> {
        self.base.vehicle.coordinator.core().subscribe()
    }

    fn handle_coordinator_update(&mut self) -> Reconciled {
        let timestamp = self.base.poll_timestamp();
        if !self.base.accept_poll(timestamp) {
            return Reconciled::Skipped;
        }

        let before = self.kind.value();
        if self.base.updated_once() || self.base.key == "state" {
            self.kind.read_from_snapshot(&self.base);
        }
        let reconciled = if self.kind.value() == before {
            Reconciled::Unchanged
        } else {
            self.base.logger.debug("Polled value replaced local state");
            Reconciled::Overwritten
        };
        self.write_state();
        reconciled
    }

    fn handle_stream_update(&mut self, message: &StreamMessage) -> bool {
        if message.vin != self.base.vehicle.vin {
            return false;
        }
        let Some(value) = self.base.streaming_key.and_then(|key| message.field(key)) else {
            return false;
        };
        self.base.mark_streamed(message.timestamp);
        self.kind.read_from_stream(value);
        self.write_state();
        true
    }

    fn restore(&mut self, saved: &EntityState) {
        self.kind.restore(&self.base, saved);
    }

    /// Publishes whatever the kind applied, even when a later step failed
    async fn apply_command(&mut self, command: EntityCommand) -> Result<()> {
        let result = self.kind.apply_command(&self.base, command).await;
        self.write_state();
        result
    }
}
