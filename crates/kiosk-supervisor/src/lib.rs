//! # Kiosk Supervisor
//!
//! Owns the local processes a badge kiosk needs: the dependency database
//! backing the print queue, the print worker and the local web server.
//!
//! The supervisor discovers an already running database before starting a
//! bundled copy, forwards child output as log lines, reports unexpected
//! exits without restarting, and stops everything in a fixed order on quit.
//! A newline-delimited JSON control surface ([`control::serve`]) lets a tray
//! front end drive it over pipes.
//!
//! ## Modules
//!
//! - [`supervisor`]: lifecycle and status of the three children
//! - [`process`]: process specs, launching and output forwarding
//! - [`discovery`]: dependency database `PING` probe
//! - [`control`]: request/response commands and pushed events
//! - [`settings`]: persisted `{ printerName, kioskId }`
//! - [`printers`]: installed printer enumeration
//! - [`labels`]: old label file cleanup

pub mod control;
pub mod discovery;
pub mod error;
pub mod labels;
pub mod printers;
pub mod process;
pub mod settings;
pub mod supervisor;

pub use control::{ControlEnvelope, ControlRequest, ControlResponse, Outbound, dispatch, serve};
pub use discovery::ProbeError;
pub use error::{Result, SupervisorError};
pub use process::{
    ChildExit, LogStream, ProcessLauncher, ProcessSpec, ServiceKind, ServiceStatus, SystemLauncher,
};
pub use settings::{SettingsStore, SettingsUpdate, SupervisorSettings};
pub use supervisor::{
    CommandLine, DependencyReport, ServiceRecord, StatusReport, Supervisor, SupervisorEvent,
    SupervisorOptions,
};
