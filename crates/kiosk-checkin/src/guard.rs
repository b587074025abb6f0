//! Duplicate-Scan Guard.
//!
//! Decides whether a logical scan may start a pipeline run. Gates are
//! evaluated in order and the first one that fails rejects the scan:
//!
//! 1. configuration loaded
//! 2. kiosk enabled
//! 3. payload yields an identifier; an unreadable payload that arrives
//!    while the in-flight gate is closed is rejected as in flight
//! 4. identity gate: same identifier as the last accepted scan within the
//!    identity window
//! 5. in-flight gate: a run is executing, or finished less than the
//!    cooldown ago
//!
//! An admitted scan closes the in-flight gate and overwrites the single
//! [`DedupEntry`]; [`ScanGuard::finish`] reopens the gate after the cooldown.
//!
//! The guard never reads a clock. Admission uses the scan's `received_at`
//! and completion takes `now` explicitly.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//! use kiosk_checkin::{GuardConfig, ScanGuard, ScanRejection};
//! use kiosk_core::{KioskConfig, ScanEvent, ScanSource};
//!
//! let mut guard = ScanGuard::new(GuardConfig::default());
//! let config = Some(Arc::new(KioskConfig::default()));
//! let t0 = Instant::now();
//!
//! let first = ScanEvent::at("EXP2025-0001", ScanSource::Hardware, t0);
//! assert!(guard.admit(&first, config.clone()).is_ok());
//! guard.finish(t0 + Duration::from_millis(500));
//!
//! let again = ScanEvent::at("EXP2025-0001", ScanSource::Hardware, t0 + Duration::from_secs(2));
//! assert!(matches!(
//!     guard.admit(&again, config),
//!     Err(ScanRejection::DuplicateIdentity { .. })
//! ));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiosk_core::constants::{IDENTITY_WINDOW_MS, IN_FLIGHT_COOLDOWN_MS};
use kiosk_core::{KioskConfig, RegistrationIdentifier, ScanEvent};
use tracing::{debug, trace};

use crate::notice::OperatorNotice;

/// Timing windows for the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    /// How long the in-flight gate stays closed after a run completes.
    pub in_flight_cooldown: Duration,

    /// How long the same identifier is rejected after being accepted.
    pub identity_window: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            in_flight_cooldown: Duration::from_millis(IN_FLIGHT_COOLDOWN_MS),
            identity_window: Duration::from_millis(IDENTITY_WINDOW_MS),
        }
    }
}

/// The most recently accepted identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub identifier: RegistrationIdentifier,
    pub last_seen_at: Instant,
}

/// Why a scan did not start a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanRejection {
    /// No kiosk configuration has been loaded yet.
    ConfigUnavailable,

    /// The kiosk is switched off in its configuration.
    KioskDisabled,

    /// The payload carried no usable identifier.
    Malformed(String),

    /// The same identifier was accepted within the identity window.
    DuplicateIdentity { identifier: RegistrationIdentifier },

    /// A run is executing or cooling down.
    InFlight,
}

impl ScanRejection {
    /// Rejections that count as failed check-ins rather than suppressed noise.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Notice shown to the operator.
    pub fn notice(&self) -> OperatorNotice {
        match self {
            Self::ConfigUnavailable => OperatorNotice::info(
                "System initializing",
                "The kiosk is still loading its settings",
            )
            .with_hint("wait a few seconds and scan again"),
            Self::KioskDisabled => OperatorNotice::warning(
                "Kiosk disabled",
                "Self check-in is turned off for this kiosk",
            )
            .with_hint("ask the event staff to enable the kiosk"),
            Self::Malformed(reason) => {
                OperatorNotice::error("Invalid badge", format!("The code could not be read: {reason}"))
                    .with_hint("scan the QR code on the registration confirmation")
            }
            Self::DuplicateIdentity { identifier } => OperatorNotice::info(
                "Already scanned",
                format!("Badge {identifier} was just scanned"),
            ),
            Self::InFlight => OperatorNotice::info(
                "Please wait",
                "The previous badge is still being processed",
            ),
        }
    }
}

impl fmt::Display for ScanRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigUnavailable => write!(f, "config unavailable"),
            Self::KioskDisabled => write!(f, "kiosk disabled"),
            Self::Malformed(reason) => write!(f, "malformed payload: {reason}"),
            Self::DuplicateIdentity { identifier } => write!(f, "duplicate identity {identifier}"),
            Self::InFlight => write!(f, "in flight"),
        }
    }
}

/// A scan that passed every gate.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identifier: RegistrationIdentifier,
    /// The snapshot the run must use.
    pub config: Arc<KioskConfig>,
}

/// Owner of the in-flight flag and the single dedup entry.
#[derive(Debug)]
pub struct ScanGuard {
    config: GuardConfig,
    running: bool,
    cooldown_until: Option<Instant>,
    last_accepted: Option<DedupEntry>,
}

impl ScanGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            running: false,
            cooldown_until: None,
            last_accepted: None,
        }
    }

    /// Evaluate every gate for `scan` against the current configuration.
    ///
    /// On success the in-flight gate is closed and the dedup entry
    /// overwritten; the caller must call [`finish`](Self::finish) when the
    /// run ends.
    ///
    /// # Errors
    ///
    /// Returns the first gate that rejected the scan. A rejected scan leaves
    /// the guard unchanged.
    pub fn admit(
        &mut self,
        scan: &ScanEvent,
        config: Option<Arc<KioskConfig>>,
    ) -> Result<Admission, ScanRejection> {
        let now = scan.received_at;

        let config = config.ok_or(ScanRejection::ConfigUnavailable)?;
        if !config.enabled {
            return Err(ScanRejection::KioskDisabled);
        }

        let identifier = match scan.identifier() {
            Ok(identifier) => identifier,
            Err(_) if self.is_in_flight(now) => {
                trace!("In-flight gate closed for unreadable payload");
                return Err(ScanRejection::InFlight);
            }
            Err(e) => return Err(ScanRejection::Malformed(e.to_string())),
        };

        if let Some(entry) = &self.last_accepted
            && entry.identifier == identifier
            && now.saturating_duration_since(entry.last_seen_at) < self.config.identity_window
        {
            trace!(identifier = %identifier, "Identity gate closed");
            return Err(ScanRejection::DuplicateIdentity { identifier });
        }

        if self.is_in_flight(now) {
            trace!(identifier = %identifier, "In-flight gate closed");
            return Err(ScanRejection::InFlight);
        }

        self.running = true;
        self.cooldown_until = None;
        self.last_accepted = Some(DedupEntry {
            identifier: identifier.clone(),
            last_seen_at: now,
        });
        debug!(identifier = %identifier, source = %scan.source, "Scan admitted");

        Ok(Admission { identifier, config })
    }

    /// Mark the current run finished at `now`, starting the cooldown.
    pub fn finish(&mut self, now: Instant) {
        self.running = false;
        self.cooldown_until = Some(now + self.config.in_flight_cooldown);
    }

    /// Whether the in-flight gate is closed at `now`.
    pub fn is_in_flight(&self, now: Instant) -> bool {
        self.running || self.cooldown_until.is_some_and(|until| now < until)
    }

    /// The current dedup entry.
    pub fn last_accepted(&self) -> Option<&DedupEntry> {
        self.last_accepted.as_ref()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}

impl Default for ScanGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}
