//! Push stream seam
//!
//! The telemetry stream client lives outside this crate. It hands decoded
//! messages to a [`StreamChannel`], which fans them out to every listener
//! (setup's per-vehicle task and streaming entities).

use crate::helpers::Snapshot;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

const STREAM_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    Disconnected,
}

impl Connectivity {
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "CONNECTED" => Some(Connectivity::Connected),
            "DISCONNECTED" => Some(Connectivity::Disconnected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// Telemetry fields keyed by stream field name (`InsideTemp`, `Locked`, ...)
    Data(Snapshot),
    /// Alerts, newest first, each with `name` and `startedAt`
    Alerts(Vec<Value>),
    /// Errors, newest first, each with `name` and `createdAt`
    Errors(Vec<Value>),
    /// A full vehicle data body as returned by the polling endpoint
    VehicleData(Value),
    /// Vehicle wake state
    State(String),
    Connectivity(Connectivity),
}

/// One message from the stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub vin: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub payload: StreamPayload,
}

impl StreamMessage {
    /// Value of one telemetry field, if this message carries it
    pub fn field(&self, key: &str) -> Option<&Value> {
        match &self.payload {
            StreamPayload::Data(fields) => fields.get(key),
            _ => None,
        }
    }
}

pub trait VehicleStream: Send + Sync {
    /// Stream server host; `None` when streaming is not configured
    fn server(&self) -> Option<String>;

    fn connected(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<StreamMessage>;
}

/// In-process fan-out the stream client publishes into
pub struct StreamChannel {
    server: Option<String>,
    connected: AtomicBool,
    tx: broadcast::Sender<StreamMessage>,
}

impl StreamChannel {
    pub fn new(server: Option<String>) -> Self {
        let (tx, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            server,
            connected: AtomicBool::new(false),
            tx,
        }
    }

    /// Deliver a message; returns the number of listeners reached
    pub fn publish(&self, message: StreamMessage) -> usize {
        if let StreamPayload::Connectivity(status) = &message.payload {
            self.connected
                .store(*status == Connectivity::Connected, Ordering::SeqCst);
        }
        self.tx.send(message).unwrap_or(0)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl VehicleStream for StreamChannel {
    fn server(&self) -> Option<String> {
        self.server.clone()
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.tx.subscribe()
    }
}
