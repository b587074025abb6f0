use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Payload errors
    #[error("Invalid scan payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid kiosk identity: {0}")]
    InvalidKioskId(String),

    #[error("Unknown job status: {0}")]
    UnknownJobStatus(String),

    // State machine errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
