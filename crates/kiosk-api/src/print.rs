//! Print Job Client.
//!
//! Badges are normally printed through the queue service: the kiosk submits
//! a job, gets back a job id and queue position, and may poll the job's
//! status. The queue service owns retries and worker draining.
//!
//! Older deployments without a queue post straight to the printer service
//! on the kiosk PC instead; [`ApiClient::direct_print`] covers that path.

use kiosk_core::{JobStatusReport, QrValidation, QueuedPrint, RegistrationIdentifier};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::client::{append_segments, decode, ApiClient};
use crate::error::{ApiError, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueuePrintRequest<'a> {
    identifier: &'a str,
    printer_service_url: &'a str,
    kiosk_id: &'a str,
}

/// Body of the legacy `POST {printerServiceUrl}/print` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectPrintRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub identifier: String,
    pub qr_code: String,
}

impl DirectPrintRequest {
    /// Build the label request for a validated visitor.
    pub fn for_visitor(identifier: &RegistrationIdentifier, validation: &QrValidation) -> Self {
        Self {
            name: validation.visitor.name.clone(),
            location: validation.visitor.city.clone(),
            identifier: identifier.to_string(),
            qr_code: identifier.to_string(),
        }
    }
}

impl ApiClient {
    /// Submit a print job to the queue service.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue service refuses the job or cannot be reached.
    pub async fn submit_print(
        &self,
        identifier: &RegistrationIdentifier,
        printer_service_url: &str,
    ) -> Result<QueuedPrint> {
        let url = self.endpoint(&["registrations", "queue-print"])?;
        let body = QueuePrintRequest {
            identifier: identifier.as_str(),
            printer_service_url,
            kiosk_id: self.kiosk_id.as_str(),
        };
        let data = self.execute(self.http.post(url).json(&body)).await?;
        let queued: QueuedPrint = decode(data, "queued print")?;
        info!(
            identifier = %identifier,
            job_id = %queued.job_id,
            position = queued.queue_position,
            "Print job queued"
        );
        Ok(queued)
    }

    /// Read the current status of a queued job.
    ///
    /// Single read; the caller decides whether and how often to poll.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the queue service no longer knows the job.
    pub async fn poll_status(&self, job_id: &str) -> Result<JobStatusReport> {
        let url = self.endpoint(&["print-queue", "job", job_id])?;
        let data = self.execute(self.http.get(url)).await?;
        let report: JobStatusReport = decode(data, "job status")?;
        debug!(job_id, status = %report.status, progress = report.progress, "Job status");
        Ok(report)
    }

    /// Print a label directly on the kiosk's printer service, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the printer service URL is invalid, the service
    /// refuses the label, or it cannot be reached.
    pub async fn direct_print(
        &self,
        printer_service_url: &str,
        request: &DirectPrintRequest,
    ) -> Result<()> {
        let base = Url::parse(printer_service_url.trim()).map_err(|e| {
            ApiError::Config(format!(
                "invalid printer service URL {printer_service_url:?}: {e}"
            ))
        })?;
        let url = append_segments(base, &["print"])?;
        self.execute(self.http.post(url).json(request)).await?;
        info!(identifier = %request.identifier, "Label sent to printer service");
        Ok(())
    }
}
