//! End-to-end runner scenarios against a counting fake API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiosk_api::{ApiError, CheckInApi, DirectPrintRequest, Result};
use kiosk_checkin::{
    CheckInState, ConfigHandle, FailureKind, GuardConfig, KioskEvent, KioskPipeline, KioskRunner,
    PipelineOutcome, PrintOutcome, ScanRejection,
};
use kiosk_core::{
    CheckInReceipt, ExhibitionSummary, JobStatus, JobStatusReport, KioskConfig, QrValidation,
    QueuedPrint, RegistrationIdentifier, RegistrationSummary, ScanEvent, ScanSource, VisitorSummary,
};
use kiosk_scanner::AdapterEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

#[derive(Default)]
struct FakeApi {
    validate_calls: AtomicUsize,
    check_in_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    direct_calls: AtomicUsize,
    already_checked_in: AtomicBool,
    validate_delay: Option<Duration>,
    submit_error: Mutex<Option<ApiError>>,
    poll_error: Mutex<Option<ApiError>>,
}

impl FakeApi {
    fn checked_in() -> Self {
        let api = Self::default();
        api.already_checked_in.store(true, Ordering::SeqCst);
        api
    }

    fn slow(delay: Duration) -> Self {
        Self {
            validate_delay: Some(delay),
            ..Self::default()
        }
    }

    fn calls(&self) -> [usize; 3] {
        [
            self.validate_calls.load(Ordering::SeqCst),
            self.check_in_calls.load(Ordering::SeqCst),
            self.submit_calls.load(Ordering::SeqCst),
        ]
    }
}

impl CheckInApi for FakeApi {
    async fn fetch_config(&self) -> Result<KioskConfig> {
        Ok(KioskConfig::default())
    }

    async fn validate_qr(&self, identifier: &RegistrationIdentifier) -> Result<QrValidation> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.validate_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(QrValidation {
            visitor: VisitorSummary {
                name: "Ana Souza".into(),
                ..Default::default()
            },
            registration: RegistrationSummary {
                id: identifier.to_string(),
                ..Default::default()
            },
            exhibition: ExhibitionSummary {
                name: "Expo 2025".into(),
                venue: None,
            },
            already_checked_in: self.already_checked_in.load(Ordering::SeqCst),
            check_in_time: None,
        })
    }

    async fn check_in(&self, _identifier: &RegistrationIdentifier) -> Result<CheckInReceipt> {
        self.check_in_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CheckInReceipt::default())
    }

    async fn submit_print(
        &self,
        _identifier: &RegistrationIdentifier,
        _printer_service_url: &str,
    ) -> Result<QueuedPrint> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.submit_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(QueuedPrint {
            job_id: "job-1".into(),
            queue_position: 0,
        })
    }

    async fn poll_status(&self, _job_id: &str) -> Result<JobStatusReport> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.poll_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(JobStatusReport {
            status: JobStatus::Active,
            progress: 40,
            result: None,
            error: None,
        })
    }

    async fn direct_print(
        &self,
        _printer_service_url: &str,
        _request: &DirectPrintRequest,
    ) -> Result<()> {
        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    tx: mpsc::Sender<AdapterEvent>,
    events: broadcast::Receiver<KioskEvent>,
    api: Arc<FakeApi>,
    pipeline: Arc<KioskPipeline<FakeApi>>,
    config: ConfigHandle,
}

impl Harness {
    fn start(api: FakeApi, config: Option<KioskConfig>) -> Self {
        let api = Arc::new(api);
        let pipeline = Arc::new(KioskPipeline::new(api.clone()));
        let handle = match config {
            Some(config) => ConfigHandle::with_config(config),
            None => ConfigHandle::new(),
        };
        let runner = KioskRunner::new(pipeline.clone(), handle.clone(), GuardConfig::default());
        let events = runner.subscribe();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(runner.run(rx));

        Self {
            tx,
            events,
            api,
            pipeline,
            config: handle,
        }
    }

    async fn scan(&self, payload: &str) {
        let event = ScanEvent::at(payload, ScanSource::Hardware, Instant::now().into_std());
        self.tx.send(AdapterEvent::Scan(event)).await.unwrap();
    }

    async fn next(&mut self) -> KioskEvent {
        self.events.recv().await.unwrap()
    }

    async fn next_rejection(&mut self) -> ScanRejection {
        match self.next().await {
            KioskEvent::Rejected { rejection, .. } => rejection,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    async fn next_outcome(&mut self) -> PipelineOutcome {
        loop {
            if let KioskEvent::Finished(outcome) = self.next().await {
                return outcome;
            }
        }
    }
}

fn config() -> KioskConfig {
    KioskConfig::default()
}

#[tokio::test(start_paused = true)]
async fn test_fresh_scan_checks_in_and_prints() {
    let mut kiosk = Harness::start(FakeApi::default(), Some(config()));

    kiosk.scan("EXP2025-0001").await;
    match kiosk.next().await {
        KioskEvent::Started { identifier, source } => {
            assert_eq!(identifier.as_str(), "EXP2025-0001");
            assert_eq!(source, ScanSource::Hardware);
        }
        other => panic!("expected start, got {other:?}"),
    }

    let outcome = kiosk.next_outcome().await;
    let PipelineOutcome::Completed { print, reprint, notice, .. } = &outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert!(!reprint);
    let PrintOutcome::Queued { job, status } = print else {
        panic!("expected queued print, got {print:?}");
    };
    assert_eq!(job.queue_position, 0);
    assert_eq!(job.status, JobStatus::Active);
    assert_eq!(status.as_ref().unwrap().progress, 40);
    assert!(notice.message.contains("position 0"));

    assert_eq!(kiosk.api.calls(), [1, 1, 1]);
    assert_eq!(kiosk.api.poll_calls.load(Ordering::SeqCst), 1);

    let stats = kiosk.pipeline.stats();
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.last_printed.unwrap().visitor_name, "Ana Souza");

    let states: Vec<_> = kiosk.pipeline.history().iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            CheckInState::Validating,
            CheckInState::CheckingIn,
            CheckInState::Printing,
            CheckInState::Done,
            CheckInState::Idle,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_immediate_rescan_is_suppressed() {
    let mut kiosk = Harness::start(FakeApi::default(), Some(config()));

    kiosk.scan("EXP2025-0001").await;
    assert!(kiosk.next_outcome().await.is_success());

    tokio::time::sleep(Duration::from_secs(1)).await;
    kiosk.scan("EXP2025-0001").await;
    assert!(matches!(
        kiosk.next_rejection().await,
        ScanRejection::DuplicateIdentity { .. }
    ));

    assert_eq!(kiosk.api.calls(), [1, 1, 1]);
    let stats = kiosk.pipeline.stats();
    assert_eq!((stats.successes, stats.failures), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn test_checked_in_visitor_blocked_without_repeat_printing() {
    let mut kiosk = Harness::start(FakeApi::checked_in(), Some(config()));

    kiosk.scan("EXP2025-0002").await;
    let outcome = kiosk.next_outcome().await;
    let PipelineOutcome::Failed { kind, notice, .. } = &outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(*kind, FailureKind::AlreadyProcessed);
    assert!(notice.message.contains("repeat printing is disabled"));

    assert_eq!(kiosk.api.calls(), [1, 0, 0]);
    assert_eq!(kiosk.pipeline.stats().failures, 1);
    assert_eq!(kiosk.pipeline.state(), CheckInState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_checked_in_visitor_reprinted_when_allowed() {
    let config = KioskConfig {
        allow_repeat_printing: true,
        ..config()
    };
    let mut kiosk = Harness::start(FakeApi::checked_in(), Some(config));

    kiosk.scan("EXP2025-0002").await;
    let outcome = kiosk.next_outcome().await;
    assert!(matches!(outcome, PipelineOutcome::Completed { reprint: true, .. }));
    assert_eq!(kiosk.api.calls(), [1, 0, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_scan_before_config_is_rejected() {
    let mut kiosk = Harness::start(FakeApi::default(), None);

    kiosk.scan("EXP2025-0003").await;
    let rejection = kiosk.next_rejection().await;
    assert_eq!(rejection, ScanRejection::ConfigUnavailable);
    assert_eq!(rejection.notice().title, "System initializing");
    assert_eq!(kiosk.api.calls(), [0, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_config_loaded_mid_session_is_used() {
    let mut kiosk = Harness::start(FakeApi::default(), None);
    kiosk.config.load(kiosk.api.as_ref()).await.unwrap();

    kiosk.scan("EXP2025-0004").await;
    assert!(kiosk.next_outcome().await.is_success());

    kiosk.config.replace(KioskConfig {
        enabled: false,
        ..config()
    });
    tokio::time::sleep(Duration::from_secs(10)).await;
    kiosk.scan("EXP2025-0005").await;
    assert_eq!(kiosk.next_rejection().await, ScanRejection::KioskDisabled);
}

#[tokio::test(start_paused = true)]
async fn test_scans_during_run_and_cooldown_are_rejected() {
    let mut kiosk = Harness::start(FakeApi::slow(Duration::from_secs(2)), Some(config()));

    kiosk.scan("EXP-A").await;
    assert!(matches!(kiosk.next().await, KioskEvent::Started { .. }));

    for code in ["EXP-B", "EXP-C", "EXP-D", "EXP-E", "EXP-F"] {
        tokio::time::sleep(Duration::from_millis(100)).await;
        kiosk.scan(code).await;
        assert_eq!(kiosk.next_rejection().await, ScanRejection::InFlight);
    }

    assert!(kiosk.next_outcome().await.is_success());

    tokio::time::sleep(Duration::from_secs(1)).await;
    kiosk.scan("EXP-G").await;
    assert_eq!(kiosk.next_rejection().await, ScanRejection::InFlight);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    kiosk.scan("EXP-A").await;
    assert!(matches!(kiosk.next().await, KioskEvent::Started { .. }));
    assert!(kiosk.next_outcome().await.is_success());

    assert_eq!(kiosk.api.validate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_print_test_mode_simulates() {
    let config = KioskConfig {
        print_test_mode: true,
        ..config()
    };
    let mut kiosk = Harness::start(FakeApi::default(), Some(config));

    kiosk.scan("EXP-T").await;
    let outcome = kiosk.next_outcome().await;
    assert!(matches!(
        outcome,
        PipelineOutcome::Completed { print: PrintOutcome::Simulated, .. }
    ));
    assert_eq!(kiosk.api.calls(), [1, 1, 0]);
    assert!(kiosk.pipeline.stats().last_printed.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_auto_print_disabled_skips_printing() {
    let config = KioskConfig {
        auto_print_enabled: false,
        ..config()
    };
    let mut kiosk = Harness::start(FakeApi::default(), Some(config));

    kiosk.scan("EXP-N").await;
    let outcome = kiosk.next_outcome().await;
    assert!(matches!(
        outcome,
        PipelineOutcome::Completed { print: PrintOutcome::Skipped, .. }
    ));
    assert_eq!(kiosk.api.calls(), [1, 1, 0]);

    let stats = kiosk.pipeline.stats();
    assert_eq!(stats.successes, 1);
    assert!(stats.last_printed.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_direct_print_bypasses_queue() {
    let config = KioskConfig {
        use_direct_print: true,
        ..config()
    };
    let mut kiosk = Harness::start(FakeApi::default(), Some(config));

    kiosk.scan("EXP-D").await;
    let outcome = kiosk.next_outcome().await;
    assert!(matches!(
        outcome,
        PipelineOutcome::Completed { print: PrintOutcome::Direct, .. }
    ));
    assert_eq!(kiosk.api.submit_calls.load(Ordering::SeqCst), 0);
    assert_eq!(kiosk.api.direct_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_printer_failure_is_classified() {
    let api = FakeApi::default();
    *api.submit_error.lock().unwrap() = Some(ApiError::Server {
        status: 500,
        message: "Printer offline".into(),
    });
    let mut kiosk = Harness::start(api, Some(config()));

    kiosk.scan("EXP-P").await;
    let outcome = kiosk.next_outcome().await;
    let PipelineOutcome::Failed { kind, notice, .. } = &outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(*kind, FailureKind::Connectivity { printer: true });
    assert_eq!(
        notice.hint.as_deref(),
        Some("check that the print service is running on the kiosk")
    );
    assert_eq!(kiosk.pipeline.stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_poll_failure_does_not_fail_run() {
    let api = FakeApi::default();
    *api.poll_error.lock().unwrap() = Some(ApiError::Timeout(8000));
    let mut kiosk = Harness::start(api, Some(config()));

    kiosk.scan("EXP-S").await;
    let outcome = kiosk.next_outcome().await;
    let PipelineOutcome::Completed { print: PrintOutcome::Queued { job, status }, .. } = outcome
    else {
        panic!("expected queued print, got {outcome:?}");
    };
    assert!(status.is_none());
    assert_eq!(job.status, JobStatus::Queued);
}

#[tokio::test(start_paused = true)]
async fn test_blank_payload_counts_as_failure() {
    let mut kiosk = Harness::start(FakeApi::default(), Some(config()));

    kiosk.scan("   ").await;
    let outcome = kiosk.next_outcome().await;
    assert!(matches!(
        outcome,
        PipelineOutcome::Failed { kind: FailureKind::Validation, identifier: None, .. }
    ));
    assert_eq!(kiosk.api.calls(), [0, 0, 0]);
    assert_eq!(kiosk.pipeline.stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_blank_payload_during_run_is_suppressed() {
    let mut kiosk = Harness::start(FakeApi::slow(Duration::from_secs(2)), Some(config()));

    kiosk.scan("EXP-A").await;
    assert!(matches!(kiosk.next().await, KioskEvent::Started { .. }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    kiosk.scan("   ").await;
    match kiosk.next().await {
        KioskEvent::Rejected { rejection, notice, .. } => {
            assert_eq!(rejection, ScanRejection::InFlight);
            assert_eq!(notice.title, "Please wait");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(kiosk.pipeline.stats().failures, 0);

    let outcome = kiosk.next_outcome().await;
    assert!(outcome.is_success());
    assert_eq!(outcome.identifier().map(|id| id.as_str()), Some("EXP-A"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    kiosk.scan("").await;
    assert_eq!(kiosk.next_rejection().await, ScanRejection::InFlight);

    let stats = kiosk.pipeline.stats();
    assert_eq!((stats.successes, stats.failures), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn test_runner_finishes_in_flight_run_on_close() {
    let mut kiosk = Harness::start(FakeApi::slow(Duration::from_secs(1)), Some(config()));

    kiosk.scan("EXP-Z").await;
    assert!(matches!(kiosk.next().await, KioskEvent::Started { .. }));
    drop(kiosk.tx);

    let mut outcome = None;
    while let Ok(event) = kiosk.events.recv().await {
        if let KioskEvent::Finished(o) = event {
            outcome = Some(o);
        }
    }
    assert!(outcome.unwrap().is_success());
}
