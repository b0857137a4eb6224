//! Poll loops for coordinators
//!
//! One task per coordinator. Each loop sleeps the coordinator's current
//! interval (the vehicle coordinator stretches it while letting a vehicle
//! sleep), refreshes, and exits on shutdown or when credentials are rejected.

use crate::coordinator::Coordinator;
use crate::logging::{StructuredLogger, get_logger};
use crate::models::BridgeData;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Scheduler {
    tasks: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    logger: StructuredLogger,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tasks: Vec::new(),
            shutdown,
            logger: get_logger("scheduler"),
        }
    }

    /// Start polling one coordinator
    pub fn spawn(&mut self, coordinator: Arc<dyn Coordinator>) {
        let shutdown = self.shutdown.subscribe();
        let logger = self.logger.clone();
        self.tasks
            .push(tokio::spawn(poll_loop(coordinator, shutdown, logger)));
    }

    /// Start polling every coordinator of the account
    pub fn spawn_all(&mut self, data: &BridgeData) {
        for vehicle in &data.vehicles {
            self.spawn(vehicle.coordinator.clone());
        }
        for site in &data.energysites {
            for coordinator in site.coordinators() {
                self.spawn(coordinator);
            }
        }
        self.logger
            .info(&format!("Polling {} coordinators", self.tasks.len()));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of loops still running
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Stop every loop and wait for it to finish
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.logger.info("Polling stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn poll_loop(
    coordinator: Arc<dyn Coordinator>,
    mut shutdown: watch::Receiver<bool>,
    logger: StructuredLogger,
) {
    loop {
        let interval = coordinator.core().interval();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }

        if let Err(e) = coordinator.refresh().await
            && e.is_auth()
        {
            logger.error(&format!(
                "Stopping {} polling: {}",
                coordinator.core().name(),
                e
            ));
            break;
        }
    }
}
