//! Core domain types for the badge kiosk check-in pipeline.
//!
//! Everything in here is runtime-agnostic: scan events, registration
//! identifiers, the kiosk configuration snapshot, print job records and the
//! timing constants shared by the scanner, pipeline and supervisor crates.

pub mod constants;
pub mod error;
pub mod identifier;
pub mod types;

pub use error::{Error, Result};
pub use identifier::{ExtractionStrategy, RegistrationIdentifier};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
