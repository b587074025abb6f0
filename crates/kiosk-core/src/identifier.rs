//! Registration identifier extraction from raw QR payloads.
//!
//! Badges in circulation carry three payload shapes: a JSON object, a
//! check-in URL, or the bare registration number. Extraction tries them in
//! that fixed order and the first strategy that yields a value wins.
//!
//! ```
//! use kiosk_core::{ExtractionStrategy, RegistrationIdentifier};
//!
//! let id = RegistrationIdentifier::extract(r#"{"registrationId":"EXP2025-0001"}"#).unwrap();
//! assert_eq!(id.as_str(), "EXP2025-0001");
//! assert_eq!(id.strategy(), ExtractionStrategy::Structured);
//!
//! let id = RegistrationIdentifier::extract("https://expo.example/checkin/EXP2025-0002").unwrap();
//! assert_eq!(id.as_str(), "EXP2025-0002");
//!
//! let id = RegistrationIdentifier::extract("  EXP2025-0003 ").unwrap();
//! assert_eq!(id.strategy(), ExtractionStrategy::Raw);
//! ```

use crate::{Error, Result};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// JSON fields carrying the identifier, in priority order.
const STRUCTURED_FIELDS: &[&str] = &["registrationId", "qrCode"];

/// Path segments that precede the identifier in check-in URLs.
const URL_PATH_MARKERS: &[&str] = &["checkin", "registrations", "qr"];

/// Query parameters carrying the identifier in check-in URLs.
const URL_QUERY_KEYS: &[&str] = &["qr", "id"];

/// Which extraction strategy produced an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Read from a known field of a JSON payload.
    Structured,
    /// Pulled out of a check-in URL.
    Url,
    /// The trimmed payload itself.
    Raw,
}

/// Identifier used for validation, check-in, printing and deduplication.
///
/// Equality only considers the identifier text, so the same registration
/// scanned from a URL badge and a JSON badge is treated as one identity.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct RegistrationIdentifier {
    value: String,
    #[serde(skip, default = "raw_strategy")]
    strategy: ExtractionStrategy,
}

fn raw_strategy() -> ExtractionStrategy {
    ExtractionStrategy::Raw
}

impl PartialEq for RegistrationIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl std::hash::Hash for RegistrationIdentifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl RegistrationIdentifier {
    /// Extract an identifier from a raw scan payload.
    ///
    /// # Errors
    /// Returns `Error::InvalidPayload` if the payload is blank.
    pub fn extract(payload: &str) -> Result<Self> {
        let trimmed = payload.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_payload("scan payload is empty"));
        }

        if let Some(value) = from_structured(trimmed) {
            return Ok(Self::with_strategy(value, ExtractionStrategy::Structured));
        }
        if let Some(value) = from_url(trimmed) {
            return Ok(Self::with_strategy(value, ExtractionStrategy::Url));
        }
        Ok(Self::with_strategy(
            trimmed.to_string(),
            ExtractionStrategy::Raw,
        ))
    }

    fn with_strategy(value: String, strategy: ExtractionStrategy) -> Self {
        Self { value, strategy }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn strategy(&self) -> ExtractionStrategy {
        self.strategy
    }
}

impl fmt::Display for RegistrationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl std::str::FromStr for RegistrationIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RegistrationIdentifier::extract(s)
    }
}

fn from_structured(payload: &str) -> Option<String> {
    if !payload.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let object = value.as_object()?;

    STRUCTURED_FIELDS.iter().find_map(|field| {
        let text = match object.get(*field)? {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

fn from_url(payload: &str) -> Option<String> {
    let url = Url::parse(payload).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let from_path = segments
        .windows(2)
        .rev()
        .find(|pair| URL_PATH_MARKERS.contains(&pair[0]))
        .and_then(|pair| {
            let decoded = percent_decode_str(pair[1]).decode_utf8().ok()?;
            let decoded = decoded.trim();
            (!decoded.is_empty()).then(|| decoded.to_string())
        });
    if from_path.is_some() {
        return from_path;
    }

    URL_QUERY_KEYS.iter().find_map(|key| {
        url.query_pairs()
            .find(|(k, v)| k.as_ref() == *key && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
    })
}
