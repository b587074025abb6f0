//! HTTP client for the registration API.
//!
//! Every response from the API is wrapped in a `{ success, data?, message? }`
//! envelope. [`ApiClient`] unwraps it, maps HTTP status codes onto
//! [`ApiError`] and applies a fixed client-side timeout to every call.
//!
//! ```text
//! KioskPipeline
//!     │
//!     └─> ApiClient ───(HTTP)───> Registration API
//!             │                      ├─ GET  /kiosk/config
//!             │                      ├─ GET  /registrations/validate-qr/{id}
//!             │                      ├─ POST /registrations/check-in
//!             │                      ├─ POST /registrations/queue-print
//!             │                      └─ GET  /print-queue/job/{jobId}
//!             │
//!             └──────────(HTTP)───> Printer service (legacy POST /print)
//! ```
//!
//! # Design Principles
//!
//! - **No automatic retry**: the queue service owns retries; a failed call
//!   surfaces as a failed pipeline run.
//! - **No cancellation**: once issued, a call runs until it answers or times out.
//!
//! # Example
//!
//! ```no_run
//! use kiosk_api::{ApiClient, ApiClientConfig};
//! use kiosk_core::{KioskId, RegistrationIdentifier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ApiClientConfig::new("http://localhost:5000/api", KioskId::new("hall-a-01")?);
//! let client = ApiClient::new(config)?;
//!
//! let id = RegistrationIdentifier::extract("EXP2025-0001")?;
//! let validation = client.validate_qr(&id).await?;
//! println!("{} checked in: {}", validation.visitor.name, validation.already_checked_in);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use kiosk_core::constants::{API_TIMEOUT_MS, KIOSK_ID_HEADER};
use kiosk_core::{CheckInReceipt, KioskConfig, KioskId, QrValidation, RegistrationIdentifier};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{ApiError, Result};

/// Configuration for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the registration API, e.g. `http://localhost:5000/api`.
    pub base_url: String,

    /// Timeout applied to every request.
    pub timeout: Duration,

    /// Identity sent with every request and with queued print jobs.
    pub kiosk_id: KioskId,
}

impl ApiClientConfig {
    /// Create a config with the default timeout.
    pub fn new(base_url: impl Into<String>, kiosk_id: KioskId) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_millis(API_TIMEOUT_MS),
            kiosk_id,
        }
    }
}

/// Response envelope shared by every API endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Serialize)]
struct CheckInRequest<'a> {
    identifier: &'a str,
}

/// Client for the registration API.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    pub(crate) http: reqwest::Client,
    base_url: Url,
    pub(crate) kiosk_id: KioskId,
    timeout: Duration,
}

impl ApiClient {
    /// Build a client from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if the base URL cannot carry a path or the
    /// HTTP client cannot be constructed.
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|e| ApiError::Config(format!("invalid base URL {:?}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Config(format!(
                "base URL cannot carry a path: {base_url}"
            )));
        }

        let mut headers = HeaderMap::new();
        let name = HeaderName::from_bytes(KIOSK_ID_HEADER.as_bytes())
            .map_err(|e| ApiError::Config(e.to_string()))?;
        let value = HeaderValue::from_str(config.kiosk_id.as_str())
            .map_err(|e| ApiError::Config(format!("kiosk id is not a valid header: {e}")))?;
        headers.insert(name, value);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        debug!(base_url = %base_url, kiosk_id = %config.kiosk_id, "API client created");

        Ok(Self {
            http,
            base_url,
            kiosk_id: config.kiosk_id,
            timeout: config.timeout,
        })
    }

    /// Identity this client sends with every request.
    pub fn kiosk_id(&self) -> &KioskId {
        &self.kiosk_id
    }

    /// Fetch the kiosk settings snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no config.
    pub async fn fetch_config(&self) -> Result<KioskConfig> {
        let url = self.endpoint(&["kiosk", "config"])?;
        let data = self.execute(self.http.get(url)).await?;
        decode(data, "kiosk config")
    }

    /// Validate a scanned identifier.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown identifiers, or a
    /// connectivity error if the API cannot be reached.
    pub async fn validate_qr(&self, identifier: &RegistrationIdentifier) -> Result<QrValidation> {
        let url = self.endpoint(&["registrations", "validate-qr", identifier.as_str()])?;
        let data = self.execute(self.http.get(url)).await?;
        decode(data, "QR validation")
    }

    /// Record the check-in for a validated identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the API refuses the check-in or cannot be reached.
    pub async fn check_in(&self, identifier: &RegistrationIdentifier) -> Result<CheckInReceipt> {
        let url = self.endpoint(&["registrations", "check-in"])?;
        let body = CheckInRequest {
            identifier: identifier.as_str(),
        };
        let data = self.execute(self.http.post(url).json(&body)).await?;
        match data {
            Some(value) => decode(Some(value), "check-in receipt"),
            None => Ok(CheckInReceipt::default()),
        }
    }

    /// Build an API URL from path segments, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        append_segments(self.base_url.clone(), segments)
    }

    /// Send a request and unwrap the response envelope.
    ///
    /// A successful response with an empty body yields `Ok(None)`.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<Option<Value>> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        trace!(%url, status = status.as_u16(), bytes = body.len(), "API response");

        let envelope = serde_json::from_str::<Envelope>(&body).ok();

        if !status.is_success() {
            let message = envelope
                .and_then(|e| e.message)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "request failed".to_string());
            warn!(%url, status = status.as_u16(), "API request failed: {}", message);
            return Err(ApiError::from_status(status.as_u16(), message));
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        let envelope = envelope.ok_or_else(|| {
            ApiError::decode(format!("{url}: response is not a JSON envelope"))
        })?;
        if !envelope.success {
            let message = envelope
                .message
                .unwrap_or_else(|| "request rejected".to_string());
            warn!(%url, "API rejected request: {}", message);
            return Err(ApiError::Rejected(message));
        }

        Ok(envelope.data)
    }

    fn transport_error(&self, error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout(self.timeout.as_millis() as u64)
        } else if error.is_decode() {
            ApiError::decode(error.to_string())
        } else {
            ApiError::Unreachable(error.to_string())
        }
    }
}

/// Append percent-encoded path segments to a base URL.
pub(crate) fn append_segments(mut url: Url, segments: &[&str]) -> Result<Url> {
    url.path_segments_mut()
        .map_err(|_| ApiError::Config("URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Deserialize the `data` field of an envelope.
pub(crate) fn decode<T: DeserializeOwned>(data: Option<Value>, what: &str) -> Result<T> {
    let value = data.ok_or_else(|| ApiError::decode(format!("{what}: response has no data")))?;
    serde_json::from_value(value).map_err(|e| ApiError::decode(format!("{what}: {e}")))
}
