//! Error types for registration API and print service calls.

use thiserror::Error;

/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned by the registration API client and print job client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request did not complete within the client timeout.
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// The service could not be reached at all.
    #[error("Service unreachable: {0}")]
    Unreachable(String),

    /// The requested registration or job does not exist (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with server state (HTTP 409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The server refused the request (other 4xx, or `success: false`).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The server failed while handling the request (5xx).
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("Invalid response: {0}")]
    Decode(String),

    /// A request with the same dedup key is already in flight.
    #[error("Request already in progress: {0}")]
    DuplicateRequest(String),

    /// The client could not be built from its configuration.
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            400..=499 => Self::Rejected(message),
            _ => Self::Server { status, message },
        }
    }

    /// Create a new decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Whether the failure is a network timeout or an unreachable service.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unreachable(_))
    }

    /// Whether an identical request was already in flight.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateRequest(_))
    }

    /// Message to show an operator, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Timeout(ms) => format!("no response after {ms}ms"),
            Self::Unreachable(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Rejected(m)
            | Self::Decode(m)
            | Self::DuplicateRequest(m)
            | Self::Config(m) => m.clone(),
            Self::Server { message, .. } => message.clone(),
        }
    }
}
