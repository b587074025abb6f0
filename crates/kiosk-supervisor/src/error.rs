//! Error types for the process supervisor.

use std::io;

use crate::process::ServiceKind;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors reported to the control surface.
///
/// None of these stop the supervisor itself; a failing child only flips its
/// own status.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A child process could not be started.
    #[error("Failed to start {service}: {reason} ({hint})")]
    SpawnFailed {
        service: ServiceKind,
        reason: String,
        hint: String,
    },

    /// The dependency database neither answered nor could be started.
    #[error("Dependency database unavailable at {host}:{port}")]
    DependencyMissing { host: String, port: u16 },

    /// Persisted settings could not be read or written.
    #[error("Settings error: {0}")]
    Settings(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SupervisorError {
    /// Build a spawn failure with a remediation hint derived from `error`.
    pub fn spawn_failed(service: ServiceKind, program: &str, error: &io::Error) -> Self {
        let hint = match error.kind() {
            io::ErrorKind::NotFound => format!("install {program} or add it to PATH"),
            io::ErrorKind::PermissionDenied => format!("check that {program} is executable"),
            _ => "see the supervisor log for details".to_string(),
        };
        Self::SpawnFailed {
            service,
            reason: error.to_string(),
            hint,
        }
    }

    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings(message.into())
    }
}
