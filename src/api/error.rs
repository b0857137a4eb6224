use thiserror::Error;

/// Result type for vendor API calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failures reported by the vendor API client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Vehicle is offline")]
    VehicleOffline,

    #[error("Internal server error")]
    InternalServerError,

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Gateway timeout")]
    GatewayTimeout,

    #[error("Device unexpected response")]
    DeviceUnexpectedResponse,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Subscription required")]
    SubscriptionRequired,

    #[error("Unauthorized missing scopes")]
    Forbidden,

    #[error("Login required")]
    LoginRequired,

    /// The body did not have the expected shape
    #[error("Invalid response from Teslemetry")]
    InvalidResponse,

    #[error("{message}")]
    Other { key: String, message: String },
}

impl ApiError {
    /// Create an error for a vendor key not covered by a dedicated variant
    pub fn other<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        ApiError::Other {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Machine-readable key, also used as the issue identifier
    pub fn key(&self) -> &str {
        match self {
            ApiError::VehicleOffline => "vehicle_offline",
            ApiError::InternalServerError => "internal_server_error",
            ApiError::ServiceUnavailable => "service_unavailable",
            ApiError::GatewayTimeout => "gateway_timeout",
            ApiError::DeviceUnexpectedResponse => "device_unexpected_response",
            ApiError::InvalidToken => "invalid_token",
            ApiError::SubscriptionRequired => "subscription_required",
            ApiError::Forbidden => "unauthorized_missing_scopes",
            ApiError::LoginRequired => "login_required",
            ApiError::InvalidResponse => "invalid_response",
            ApiError::Other { key, .. } => key,
        }
    }

    /// Human readable message
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Server-side (5xx class) failures that may clear up on their own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::InternalServerError
                | ApiError::ServiceUnavailable
                | ApiError::GatewayTimeout
                | ApiError::DeviceUnexpectedResponse
        )
    }

    /// Account problems the user has to fix outside of this bridge
    pub fn is_account_problem(&self) -> bool {
        matches!(
            self,
            ApiError::SubscriptionRequired | ApiError::Forbidden | ApiError::LoginRequired
        )
    }
}
