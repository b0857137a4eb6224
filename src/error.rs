//! Error types and handling for the Teslemetry bridge
//!
//! This module defines the error types surfaced by coordinators, entities and
//! the integration lifecycle. Vendor API failures have their own type in
//! [`crate::api::ApiError`] and are classified into these variants.

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Credentials rejected; the integration must be re-authorized
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Vendor API not reachable during setup; setup may be retried
    #[error("Not ready: {message}")]
    NotReady { message: String },

    /// A coordinator refresh failed and its data is no longer trusted
    #[error("Update failed: {message}")]
    UpdateFailed { message: String },

    /// A command argument was rejected before reaching the vendor
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// The access token lacks the scope a command needs
    #[error("Missing required scope: {scopes}")]
    MissingScope { scopes: String },

    /// A vendor command was sent but not accepted
    #[error("Command error: {message}")]
    Command { message: String },
}

impl BridgeError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        BridgeError::Config {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        BridgeError::Io {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        BridgeError::Auth {
            message: message.into(),
        }
    }

    /// Create a new not-ready error
    pub fn not_ready<S: Into<String>>(message: S) -> Self {
        BridgeError::NotReady {
            message: message.into(),
        }
    }

    /// Create a new update failure
    pub fn update_failed<S: Into<String>>(message: S) -> Self {
        BridgeError::UpdateFailed {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        BridgeError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a missing-scope error listing the alternatives that would do
    pub fn missing_scope<S: AsRef<str>>(scopes: &[S]) -> Self {
        BridgeError::MissingScope {
            scopes: scopes
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }

    /// Create a new command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        BridgeError::Command {
            message: message.into(),
        }
    }

    /// Whether this error must stop polling and trigger re-authorization
    pub fn is_auth(&self) -> bool {
        matches!(self, BridgeError::Auth { .. })
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for BridgeError {
    fn from(err: serde_yaml::Error) -> Self {
        BridgeError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization {
            message: err.to_string(),
        }
    }
}
