use super::{Entity, EntityCommand, EntityState, Platform, Reconciled};
use crate::api::{EnergyCommand, Scope};
use crate::coordinator::Coordinator;
use crate::error::{BridgeError, Result};
use crate::helpers::command_failed;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::models::EnergySiteContext;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Which site coordinator an energy entity follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteSource {
    Live,
    Info,
}

/// Shared plumbing of energy site entities that are not plain sensors
pub struct EnergyEntityBase {
    site: Arc<EnergySiteContext>,
    coordinator: Arc<dyn Coordinator>,
    key: &'static str,
    unique_id: String,
    scoped: bool,
    logger: StructuredLogger,
}

impl EnergyEntityBase {
    pub fn site(&self) -> &Arc<EnergySiteContext> {
        &self.site
    }

    pub fn key(&self) -> &str {
        self.key
    }

    pub fn scoped(&self) -> bool {
        self.scoped
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.coordinator.core().get(key)
    }

    pub fn value(&self) -> Option<Value> {
        self.get(self.key)
    }

    pub fn raise_for_scope(&self) -> Result<()> {
        if self.scoped {
            return Ok(());
        }
        Err(BridgeError::missing_scope(&[Scope::EnergyCmds.as_str()]))
    }

    /// Scope check and command; the site answers without a result flag
    pub async fn send(&self, command: EnergyCommand) -> Result<Value> {
        self.raise_for_scope()?;
        self.logger
            .debug(&format!("Sending command {}", command.endpoint()));
        self.site
            .api
            .command(command)
            .await
            .map_err(|e| command_failed(&e))
    }
}

/// Behaviour of one energy site entity kind
#[async_trait]
pub trait EnergyEntityKind: Send + Sync {
    fn platform(&self) -> Platform;

    fn key(&self) -> &'static str;

    fn source(&self) -> SiteSource;

    fn read(&mut self, base: &EnergyEntityBase);

    async fn apply_command(
        &mut self,
        _base: &EnergyEntityBase,
        command: EntityCommand,
    ) -> Result<()> {
        Err(command.unsupported())
    }

    fn value(&self) -> EntityState;
}

/// An energy site entity: shared base plus one kind
pub struct EnergyEntity<K: EnergyEntityKind> {
    base: EnergyEntityBase,
    kind: K,
}

impl<K: EnergyEntityKind> EnergyEntity<K> {
    pub fn new(site: Arc<EnergySiteContext>, mut kind: K, scoped: bool) -> Self {
        let coordinator: Arc<dyn Coordinator> = match kind.source() {
            SiteSource::Live => site.live_coordinator.clone(),
            SiteSource::Info => site.info_coordinator.clone(),
        };
        let key = kind.key();
        let logger = get_logger_with_context(
            LogContext::new(kind.platform().as_str())
                .with_site_id(site.id)
                .with_field("key", key.to_string()),
        );
        let base = EnergyEntityBase {
            unique_id: format!("{}-{}", site.id, key),
            site,
            coordinator,
            key,
            scoped,
            logger,
        };
        kind.read(&base);
        Self { base, kind }
    }

    pub fn base(&self) -> &EnergyEntityBase {
        &self.base
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }
}

#[async_trait]
impl<K: EnergyEntityKind> Entity for EnergyEntity<K> {
    fn unique_id(&self) -> &str {
        &self.base.unique_id
    }

    fn platform(&self) -> Platform {
        self.kind.platform()
    }

    fn state(&self) -> EntityState {
        let mut state = self.kind.value();
        state.available = state.available && self.base.coordinator.core().last_update_success();
        state
    }

    fn write_state(&self) -> bool {
        self.base
            .coordinator
            .core()
            .hub()
            .publish_state(&self.base.unique_id, self.state())
    }

    fn coordinator_updates(&self) -> watch::Receiver<u64> {
        self.base.coordinator.core().subscribe()
    }

    fn handle_coordinator_update(&mut self) -> Reconciled {
        let before = self.kind.value();
        self.kind.read(&self.base);
        let reconciled = if self.kind.value() == before {
            Reconciled::Unchanged
        } else {
            Reconciled::Overwritten
        };
        self.write_state();
        reconciled
    }

    async fn apply_command(&mut self, command: EntityCommand) -> Result<()> {
        let result = self.kind.apply_command(&self.base, command).await;
        self.write_state();
        result
    }
}
