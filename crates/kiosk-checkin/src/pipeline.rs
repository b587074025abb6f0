//! Check-in pipeline: validate → check in → print.
//!
//! One call to [`KioskPipeline::run`] drives a single admitted scan through
//! the [`StateMachine`] and always returns a [`PipelineOutcome`]. API errors
//! never escape as `Err`; they are classified into a [`FailureKind`] with an
//! operator notice and counted in the session statistics.
//!
//! The pipeline itself does not prevent overlapping runs. The
//! [`ScanGuard`](crate::ScanGuard) admits at most one scan at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use kiosk_api::{ApiError, CheckInApi, DirectPrintRequest};
use kiosk_core::constants::TEST_PRINT_DELAY_MS;
use kiosk_core::{JobStatusReport, KioskConfig, PrintJob, QrValidation, RegistrationIdentifier};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::notice::OperatorNotice;
use crate::state_machine::{CheckInState, StateMachine, StateTransition};

/// Classified pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureKind {
    /// Unknown, malformed or refused identifier.
    Validation,

    /// Visitor already checked in and repeat printing is disabled, or the
    /// API reported a conflict.
    AlreadyProcessed,

    /// The same request is still running elsewhere.
    InProgress,

    /// Timeout, unreachable service, or a printer-side problem.
    Connectivity { printer: bool },

    /// Anything else the API reported.
    Other,
}

/// Which remote step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validate,
    CheckIn,
    QueuePrint,
    DirectPrint,
}

impl FailureKind {
    fn classify(stage: Stage, error: &ApiError) -> Self {
        if error.is_duplicate() {
            return Self::InProgress;
        }
        let mentions_printer = error.message().to_ascii_lowercase().contains("printer");
        if mentions_printer || (stage == Stage::DirectPrint && error.is_connectivity()) {
            return Self::Connectivity { printer: true };
        }
        if error.is_connectivity() {
            return Self::Connectivity { printer: false };
        }
        match (stage, error) {
            (_, ApiError::Conflict(_)) => Self::AlreadyProcessed,
            (Stage::Validate, ApiError::NotFound(_) | ApiError::Rejected(_) | ApiError::Decode(_)) => {
                Self::Validation
            }
            _ => Self::Other,
        }
    }

    fn notice(&self, message: &str) -> OperatorNotice {
        match self {
            Self::Validation => OperatorNotice::error("Invalid badge", message)
                .with_hint("check the code or send the visitor to the registration desk"),
            Self::AlreadyProcessed => OperatorNotice::warning("Already checked in", message)
                .with_hint("enable repeat printing in the kiosk settings to reprint badges"),
            Self::InProgress => OperatorNotice::info("Already processing", message)
                .with_hint("wait for the current request to finish"),
            Self::Connectivity { printer: true } => OperatorNotice::error("Printer unavailable", message)
                .with_hint("check that the print service is running on the kiosk"),
            Self::Connectivity { printer: false } => OperatorNotice::error("Connection problem", message)
                .with_hint("check the kiosk network connection and scan again"),
            Self::Other => OperatorNotice::error("Check-in failed", message),
        }
    }
}

/// How the badge was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PrintOutcome {
    /// Submitted to the queue service, with the one status read taken afterwards.
    Queued {
        job: PrintJob,
        status: Option<JobStatusReport>,
    },

    /// Sent straight to the printer service.
    Direct,

    /// Print test mode; nothing was printed.
    Simulated,

    /// Auto-print is disabled.
    Skipped,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed {
        identifier: RegistrationIdentifier,
        visitor_name: String,
        reprint: bool,
        print: PrintOutcome,
        notice: OperatorNotice,
    },
    Failed {
        identifier: Option<RegistrationIdentifier>,
        kind: FailureKind,
        notice: OperatorNotice,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn notice(&self) -> &OperatorNotice {
        match self {
            Self::Completed { notice, .. } | Self::Failed { notice, .. } => notice,
        }
    }

    pub fn identifier(&self) -> Option<&RegistrationIdentifier> {
        match self {
            Self::Completed { identifier, .. } => Some(identifier),
            Self::Failed { identifier, .. } => identifier.as_ref(),
        }
    }
}

/// The badge printed most recently, for operator display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastPrinted {
    pub identifier: RegistrationIdentifier,
    pub visitor_name: String,
    pub printed_at: DateTime<Local>,
}

/// Counters for the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub successes: u64,
    pub failures: u64,
    pub last_printed: Option<LastPrinted>,
}

/// Failure raised inside a run before it is turned into an outcome.
struct RunFailure {
    kind: FailureKind,
    message: String,
}

impl RunFailure {
    fn api(stage: Stage, error: ApiError) -> Self {
        Self {
            kind: FailureKind::classify(stage, &error),
            message: error.message(),
        }
    }

    fn state(error: kiosk_core::Error) -> Self {
        Self {
            kind: FailureKind::Other,
            message: error.to_string(),
        }
    }
}

/// Successful run before counters are updated.
struct RunSuccess {
    visitor_name: String,
    reprint: bool,
    print: PrintOutcome,
}

/// Drives admitted scans through validation, check-in and printing.
pub struct KioskPipeline<A> {
    api: Arc<A>,
    machine: Mutex<StateMachine>,
    stats: Mutex<SessionStats>,
    test_print_delay: Duration,
}

impl<A: CheckInApi> KioskPipeline<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            machine: Mutex::new(StateMachine::new()),
            stats: Mutex::new(SessionStats::default()),
            test_print_delay: Duration::from_millis(TEST_PRINT_DELAY_MS),
        }
    }

    /// Override the simulated print duration used in print test mode.
    #[must_use]
    pub fn with_test_print_delay(mut self, delay: Duration) -> Self {
        self.test_print_delay = delay;
        self
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Current state of the flow.
    pub fn state(&self) -> CheckInState {
        *self.machine().current_state()
    }

    /// Recent state transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        self.machine().history().iter().cloned().collect()
    }

    /// Snapshot of the session counters.
    pub fn stats(&self) -> SessionStats {
        self.stats_mut().clone()
    }

    fn machine(&self) -> MutexGuard<'_, StateMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_mut(&self) -> MutexGuard<'_, SessionStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, state: CheckInState) -> Result<(), RunFailure> {
        self.machine()
            .transition_to(state)
            .map(|t| debug!(from = %t.from, to = %t.to, "Check-in state changed"))
            .map_err(RunFailure::state)
    }

    /// Run one admitted scan to completion.
    pub async fn run(
        &self,
        identifier: RegistrationIdentifier,
        config: Arc<KioskConfig>,
    ) -> PipelineOutcome {
        {
            let mut machine = self.machine();
            if machine.current_state() != &CheckInState::Idle {
                warn!(state = %machine.current_state(), "Pipeline not idle, resetting");
                machine.reset();
            }
        }

        info!(identifier = %identifier, "Check-in started");
        let result = match self.transition(CheckInState::Validating) {
            Ok(()) => self.drive(&identifier, &config).await,
            Err(failure) => Err(failure),
        };

        let outcome = match result {
            Ok(success) => self.complete(identifier, success),
            Err(failure) => self.fail(Some(identifier), failure),
        };

        let mut machine = self.machine();
        if let Err(e) = machine.transition_to(CheckInState::Idle) {
            error!("Failed to return to idle: {}", e);
            machine.reset();
        }
        drop(machine);
        outcome
    }

    /// Count a scan whose payload could not be turned into an identifier.
    pub fn record_malformed(&self, reason: &str) -> PipelineOutcome {
        warn!(reason, "Malformed scan payload");
        let kind = FailureKind::Validation;
        self.stats_mut().failures += 1;
        PipelineOutcome::Failed {
            identifier: None,
            kind,
            notice: kind.notice(&format!("The code could not be read: {reason}")),
        }
    }

    async fn drive(
        &self,
        identifier: &RegistrationIdentifier,
        config: &KioskConfig,
    ) -> Result<RunSuccess, RunFailure> {
        let validation = self
            .api
            .validate_qr(identifier)
            .await
            .map_err(|e| RunFailure::api(Stage::Validate, e))?;
        let visitor_name = validation.visitor.name.clone();
        let reprint = validation.already_checked_in;

        if reprint {
            if !config.allow_repeat_printing {
                info!(identifier = %identifier, "Already checked in, repeat printing disabled");
                return Err(RunFailure {
                    kind: FailureKind::AlreadyProcessed,
                    message: format!(
                        "{} is already checked in and repeat printing is disabled",
                        display_name(&visitor_name)
                    ),
                });
            }
            debug!(identifier = %identifier, "Reprint for checked-in visitor");
        } else {
            self.transition(CheckInState::CheckingIn)?;
            self.api
                .check_in(identifier)
                .await
                .map_err(|e| RunFailure::api(Stage::CheckIn, e))?;
        }

        if !config.auto_print_enabled {
            info!(identifier = %identifier, "Auto-print disabled, skipping badge");
            return Ok(RunSuccess {
                visitor_name,
                reprint,
                print: PrintOutcome::Skipped,
            });
        }

        self.transition(CheckInState::Printing)?;
        let print = self.print(identifier, &validation, config).await?;
        Ok(RunSuccess {
            visitor_name,
            reprint,
            print,
        })
    }

    async fn print(
        &self,
        identifier: &RegistrationIdentifier,
        validation: &QrValidation,
        config: &KioskConfig,
    ) -> Result<PrintOutcome, RunFailure> {
        if config.print_test_mode {
            debug!(identifier = %identifier, "Print test mode, simulating badge");
            tokio::time::sleep(self.test_print_delay).await;
            return Ok(PrintOutcome::Simulated);
        }

        if config.use_direct_print {
            let request = DirectPrintRequest::for_visitor(identifier, validation);
            self.api
                .direct_print(&config.printer_service_url, &request)
                .await
                .map_err(|e| RunFailure::api(Stage::DirectPrint, e))?;
            return Ok(PrintOutcome::Direct);
        }

        let queued = self
            .api
            .submit_print(identifier, &config.printer_service_url)
            .await
            .map_err(|e| RunFailure::api(Stage::QueuePrint, e))?;
        let mut job = PrintJob::queued(identifier.clone(), queued);

        let status = match self.api.poll_status(&job.job_id).await {
            Ok(report) => {
                job.status = report.status;
                Some(report)
            }
            Err(e) => {
                warn!(job_id = %job.job_id, "Job status unavailable: {}", e);
                None
            }
        };

        Ok(PrintOutcome::Queued { job, status })
    }

    fn complete(&self, identifier: RegistrationIdentifier, success: RunSuccess) -> PipelineOutcome {
        if let Err(e) = self.machine().transition_to(CheckInState::Done) {
            error!("Failed to record completion: {}", e);
        }

        let name = display_name(&success.visitor_name).to_string();
        let notice = match &success.print {
            PrintOutcome::Queued { job, .. } => OperatorNotice::success(
                format!("Welcome, {name}"),
                format!("Badge queued for printing (position {})", job.queue_position),
            ),
            PrintOutcome::Direct => {
                OperatorNotice::success(format!("Welcome, {name}"), "Badge sent to the printer")
            }
            PrintOutcome::Simulated => OperatorNotice::success(
                format!("Welcome, {name}"),
                "Test mode: badge print simulated",
            ),
            PrintOutcome::Skipped => OperatorNotice::success(
                format!("Welcome, {name}"),
                "Checked in, badge printing is disabled",
            ),
        };

        {
            let mut stats = self.stats_mut();
            stats.successes += 1;
            if success.print != PrintOutcome::Skipped {
                stats.last_printed = Some(LastPrinted {
                    identifier: identifier.clone(),
                    visitor_name: success.visitor_name.clone(),
                    printed_at: Local::now(),
                });
            }
        }

        info!(identifier = %identifier, reprint = success.reprint, "Check-in completed");
        PipelineOutcome::Completed {
            identifier,
            visitor_name: success.visitor_name,
            reprint: success.reprint,
            print: success.print,
            notice,
        }
    }

    fn fail(&self, identifier: Option<RegistrationIdentifier>, failure: RunFailure) -> PipelineOutcome {
        if let Err(e) = self.machine().transition_to(CheckInState::Error) {
            error!("Failed to record failure: {}", e);
        }
        self.stats_mut().failures += 1;

        warn!(
            identifier = identifier.as_ref().map(|i| i.as_str()).unwrap_or("-"),
            kind = ?failure.kind,
            "Check-in failed: {}",
            failure.message
        );
        PipelineOutcome::Failed {
            identifier,
            kind: failure.kind,
            notice: failure.kind.notice(&failure.message),
        }
    }
}

fn display_name(name: &str) -> &str {
    if name.trim().is_empty() { "Visitor" } else { name }
}
