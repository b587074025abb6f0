use crate::{Result, error::Error, identifier::RegistrationIdentifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Input channel a logical scan originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    /// Camera frame decoded by the QR decoder.
    Camera,
    /// USB keyboard-wedge scanner emitting raw keystrokes.
    Hardware,
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera => write!(f, "camera"),
            Self::Hardware => write!(f, "hardware"),
        }
    }
}

/// One logical scan, regardless of the channel that produced it.
///
/// Ephemeral: created per input event and consumed by the guard and the
/// pipeline immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub raw_payload: String,
    pub source: ScanSource,
    pub received_at: Instant,
}

impl ScanEvent {
    /// Create a scan event stamped with the current time.
    pub fn new(raw_payload: impl Into<String>, source: ScanSource) -> Self {
        Self::at(raw_payload, source, Instant::now())
    }

    /// Create a scan event with an explicit receive time.
    pub fn at(raw_payload: impl Into<String>, source: ScanSource, received_at: Instant) -> Self {
        Self {
            raw_payload: raw_payload.into(),
            source,
            received_at,
        }
    }

    /// Extract the registration identifier carried by this scan.
    ///
    /// # Errors
    /// Returns `Error::InvalidPayload` if the payload is blank.
    pub fn identifier(&self) -> Result<RegistrationIdentifier> {
        RegistrationIdentifier::extract(&self.raw_payload)
    }
}

/// Stable identity of one physical kiosk (sent as `kioskId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KioskId(String);

impl KioskId {
    /// Create a kiosk identity from an operator-provided string.
    ///
    /// # Errors
    /// Returns `Error::InvalidKioskId` if the value is blank or contains whitespace.
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::InvalidKioskId("kiosk id must not be empty".into()));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(Error::InvalidKioskId(format!(
                "kiosk id must not contain whitespace: {id:?}"
            )));
        }
        Ok(Self(id.to_string()))
    }

    /// Generate a fresh random identity for a device that has none yet.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("kiosk-{}", uuid::Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KioskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for KioskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        KioskId::new(s)
    }
}

/// Kiosk settings snapshot served by `GET /kiosk/config`.
///
/// Immutable once fetched; a reload replaces the whole snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KioskConfig {
    pub enabled: bool,
    pub auto_print_enabled: bool,
    pub allow_repeat_printing: bool,
    pub print_test_mode: bool,
    pub printer_service_url: String,
    pub label_width: u32,
    pub label_height: u32,
    /// Bypass the print queue and post straight to the printer service.
    pub use_direct_print: bool,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_print_enabled: true,
            allow_repeat_printing: false,
            print_test_mode: false,
            printer_service_url: "http://localhost:3001".to_string(),
            label_width: 100,
            label_height: 50,
            use_direct_print: false,
        }
    }
}

/// Visitor summary returned by QR validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitorSummary {
    pub name: String,
    pub company: Option<String>,
    pub designation: Option<String>,
    pub city: Option<String>,
}

/// Registration summary returned by QR validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationSummary {
    pub id: String,
    pub registration_number: Option<String>,
    pub category: Option<String>,
}

/// Exhibition summary returned by QR validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExhibitionSummary {
    pub name: String,
    pub venue: Option<String>,
}

/// Result of `GET /registrations/validate-qr/{identifier}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrValidation {
    pub visitor: VisitorSummary,
    pub registration: RegistrationSummary,
    pub exhibition: ExhibitionSummary,
    #[serde(default)]
    pub already_checked_in: bool,
    #[serde(default)]
    pub check_in_time: Option<String>,
}

/// Confirmation returned by `POST /registrations/check-in`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckInReceipt {
    pub message: Option<String>,
    pub check_in_time: Option<String>,
}

/// Lifecycle of a queued print job, owned by the queue service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "waiting", alias = "delayed")]
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the queue service will report no further changes.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(status)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            // Queue libraries report "waiting"/"delayed" for jobs not yet picked up.
            "queued" | "waiting" | "delayed" => Ok(Self::Queued),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::UnknownJobStatus(other.to_string())),
        }
    }
}

/// Response of `POST /registrations/queue-print`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedPrint {
    pub job_id: String,
    #[serde(default)]
    pub queue_position: u32,
}

/// Response of `GET /print-queue/job/{jobId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Client-side view of a submitted print job.
///
/// The queue service owns the job; the kiosk only records what it last read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    pub job_id: String,
    pub registration_identifier: RegistrationIdentifier,
    pub queue_position: u32,
    pub status: JobStatus,
}

impl PrintJob {
    /// Record a freshly queued job.
    pub fn queued(identifier: RegistrationIdentifier, queued: QueuedPrint) -> Self {
        Self {
            job_id: queued.job_id,
            registration_identifier: identifier,
            queue_position: queued.queue_position,
            status: JobStatus::Queued,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_kiosk_id_trims() {
        let id = KioskId::new("  hall-a-01 ").unwrap();
        assert_eq!(id.as_str(), "hall-a-01");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("hall a")]
    fn test_kiosk_id_rejects(#[case] input: &str) {
        assert!(KioskId::new(input).is_err());
    }

    #[test]
    fn test_generated_kiosk_ids_are_unique() {
        let a = KioskId::generate();
        let b = KioskId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("kiosk-"));
    }

    #[test]
    fn test_kiosk_config_partial_json_uses_defaults() {
        let config: KioskConfig =
            serde_json::from_str(r#"{"allowRepeatPrinting":true,"printTestMode":true}"#).unwrap();
        assert!(config.enabled);
        assert!(config.auto_print_enabled);
        assert!(config.allow_repeat_printing);
        assert!(config.print_test_mode);
        assert!(!config.use_direct_print);
    }

    #[rstest]
    #[case("queued", JobStatus::Queued)]
    #[case("waiting", JobStatus::Queued)]
    #[case("ACTIVE", JobStatus::Active)]
    #[case("completed", JobStatus::Completed)]
    #[case("failed", JobStatus::Failed)]
    fn test_job_status_parse(#[case] input: &str, #[case] expected: JobStatus) {
        assert_eq!(input.parse::<JobStatus>().unwrap(), expected);
    }

    #[test]
    fn test_job_status_unknown() {
        assert!(matches!(
            "paused".parse::<JobStatus>(),
            Err(Error::UnknownJobStatus(_))
        ));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
    }

    #[test]
    fn test_validation_deserializes_without_optional_fields() {
        let json = r#"{
            "visitor": {"name": "Ana Souza"},
            "registration": {"id": "EXP2025-0001"},
            "exhibition": {"name": "Expo 2025"}
        }"#;
        let validation: QrValidation = serde_json::from_str(json).unwrap();
        assert!(!validation.already_checked_in);
        assert_eq!(validation.visitor.name, "Ana Souza");
        assert!(validation.check_in_time.is_none());
    }

    #[test]
    fn test_scan_event_identifier() {
        let event = ScanEvent::new("  EXP2025-0001\n", ScanSource::Hardware);
        assert_eq!(event.identifier().unwrap().as_str(), "EXP2025-0001");
    }
}
