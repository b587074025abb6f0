//! Timing and protocol constants for the kiosk check-in pipeline.
//!
//! All windows are expressed in milliseconds so they can be fed straight into
//! `Duration::from_millis`. The values are tuned for USB "wedge" scanners,
//! which keep re-triggering 10-20 times per second while a code stays in view.
//!
//! # Usage
//!
//! ```
//! use kiosk_core::constants::*;
//! use std::time::Duration;
//!
//! let cooldown = Duration::from_millis(IN_FLIGHT_COOLDOWN_MS);
//! assert!(cooldown < Duration::from_millis(IDENTITY_WINDOW_MS));
//! ```

// ============================================================================
// Scan Ingestion
// ============================================================================

/// Inactivity window after which a partially typed keystroke buffer is dropped.
///
/// A wedge scanner emits a whole code in a few milliseconds; a gap longer
/// than this between two keys means a human is typing.
pub const KEYSTROKE_TIMEOUT_MS: u64 = 100;

/// Capacity of the logical scan channel between the adapter and the runner.
pub const SCAN_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Duplicate-Scan Guard
// ============================================================================

/// Time the in-flight gate stays closed after a pipeline run completes.
pub const IN_FLIGHT_COOLDOWN_MS: u64 = 3_000;

/// Window during which the same registration identifier is rejected.
pub const IDENTITY_WINDOW_MS: u64 = 5_000;

// ============================================================================
// Remote Calls
// ============================================================================

/// Client-side timeout applied to every registration API call.
pub const API_TIMEOUT_MS: u64 = 8_000;

/// Simulated print duration when the kiosk runs in print test mode.
pub const TEST_PRINT_DELAY_MS: u64 = 1_000;

/// Header carrying the kiosk identity on every API request.
pub const KIOSK_ID_HEADER: &str = "X-Kiosk-Id";

// ============================================================================
// Process Supervision
// ============================================================================

/// Connect + `PING` budget when probing the dependency database.
pub const DISCOVERY_TIMEOUT_MS: u64 = 2_000;

/// Interval between background dependency health checks.
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Default dependency database host.
pub const DEFAULT_DEPENDENCY_DB_HOST: &str = "127.0.0.1";

/// Default dependency database port.
pub const DEFAULT_DEPENDENCY_DB_PORT: u16 = 6379;

/// Connection cap passed to a bundled dependency database.
pub const BUNDLED_DB_MAX_CLIENTS: u32 = 64;

/// Label files older than this are removed by the cleanup command.
pub const LABEL_MAX_AGE_HOURS: u64 = 24;

/// Environment flag telling supervised children to run as plain scripts.
pub const SCRIPT_MODE_ENV: &str = "KIOSK_SCRIPT_MODE";
