//! The remote operations the check-in pipeline depends on.
//!
//! [`CheckInApi`] is the seam between the pipeline and the network: the
//! production implementation is [`ApiClient`], tests substitute counting
//! doubles. Methods return `Send` futures so a pipeline run can be driven
//! from any Tokio task.

use std::future::Future;

use kiosk_core::{
    CheckInReceipt, JobStatusReport, KioskConfig, QrValidation, QueuedPrint,
    RegistrationIdentifier,
};

use crate::client::ApiClient;
use crate::error::Result;
use crate::print::DirectPrintRequest;

/// Remote registration and print-queue operations.
pub trait CheckInApi: Send + Sync {
    /// `GET /kiosk/config`
    fn fetch_config(&self) -> impl Future<Output = Result<KioskConfig>> + Send;

    /// `GET /registrations/validate-qr/{identifier}`
    fn validate_qr(
        &self,
        identifier: &RegistrationIdentifier,
    ) -> impl Future<Output = Result<QrValidation>> + Send;

    /// `POST /registrations/check-in`
    fn check_in(
        &self,
        identifier: &RegistrationIdentifier,
    ) -> impl Future<Output = Result<CheckInReceipt>> + Send;

    /// `POST /registrations/queue-print`
    fn submit_print(
        &self,
        identifier: &RegistrationIdentifier,
        printer_service_url: &str,
    ) -> impl Future<Output = Result<QueuedPrint>> + Send;

    /// `GET /print-queue/job/{jobId}`
    fn poll_status(&self, job_id: &str) -> impl Future<Output = Result<JobStatusReport>> + Send;

    /// `POST {printerServiceUrl}/print`
    fn direct_print(
        &self,
        printer_service_url: &str,
        request: &DirectPrintRequest,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl CheckInApi for ApiClient {
    fn fetch_config(&self) -> impl Future<Output = Result<KioskConfig>> + Send {
        ApiClient::fetch_config(self)
    }

    fn validate_qr(
        &self,
        identifier: &RegistrationIdentifier,
    ) -> impl Future<Output = Result<QrValidation>> + Send {
        ApiClient::validate_qr(self, identifier)
    }

    fn check_in(
        &self,
        identifier: &RegistrationIdentifier,
    ) -> impl Future<Output = Result<CheckInReceipt>> + Send {
        ApiClient::check_in(self, identifier)
    }

    fn submit_print(
        &self,
        identifier: &RegistrationIdentifier,
        printer_service_url: &str,
    ) -> impl Future<Output = Result<QueuedPrint>> + Send {
        ApiClient::submit_print(self, identifier, printer_service_url)
    }

    fn poll_status(&self, job_id: &str) -> impl Future<Output = Result<JobStatusReport>> + Send {
        ApiClient::poll_status(self, job_id)
    }

    fn direct_print(
        &self,
        printer_service_url: &str,
        request: &DirectPrintRequest,
    ) -> impl Future<Output = Result<()>> + Send {
        ApiClient::direct_print(self, printer_service_url, request)
    }
}
