//! # Teslemetry Bridge - Tesla vehicles and energy sites for home automation
//!
//! Adapts the Teslemetry cloud API to a home-automation host: polling
//! coordinators cache vehicle and energy site data, entities expose it as
//! climate, lock, sensor and update devices, and a push stream keeps streamed
//! fields fresher than polling alone.
//!
//! ## Features
//!
//! - **Sleep friendly**: Older vehicles are left alone to fall asleep
//! - **Failure policy**: Transient vendor errors are absorbed, account problems raise issues
//! - **Streaming**: Push stream fields win over polled values within a grace window
//! - **Commands**: Scope checks, serialized wake-up and result validation
//! - **Persistence**: Last entity states survive restarts
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `api`: Vendor API traits, commands and error kinds
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `coordinator`: Vehicle and energy site polling with failure handling
//! - `entity`: Climate, lock, update and sensor entities
//! - `hub`: Event bus, issue registry and entity state store of the host
//! - `stream`: Push stream seam
//! - `models`: Per-vehicle and per-site runtime context
//! - `platform`: Entity construction and update routing
//! - `scheduler`: Poll loops
//! - `setup`: Integration lifecycle
//! - `repairs`: Fix flows for account issues
//! - `persistence`: Entity state persistence

pub mod api;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod helpers;
pub mod hub;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod platform;
pub mod repairs;
pub mod scheduler;
pub mod setup;
pub mod stream;

// Re-export commonly used types
pub use config::Config;
pub use error::{BridgeError, Result};
pub use hub::Hub;
pub use models::BridgeData;
pub use setup::{Bridge, setup, unload};
