//! Error types for scan source devices.
//!
//! Covers the ways a camera decoder or wedge scanner can stop producing
//! input: disconnection, undecodable data or plain I/O failures.

/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScannerError>;

/// Errors that can occur while reading from a scan source.
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScannerError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Whether the device will never produce input again.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnected { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
