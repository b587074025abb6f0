//! Kiosk runner: the single consumer of logical scans.
//!
//! The runner owns the [`ScanGuard`] and at most one in-flight pipeline run.
//! Scans keep being received while a run is outstanding, so repeated
//! triggers are rejected immediately instead of queueing behind it.
//!
//! ```text
//! ScanSourceAdapter ──scans──► KioskRunner ──admit──► ScanGuard
//!                                   │
//!                                   ├── run ──► KioskPipeline ──► CheckInApi
//!                                   │
//!                                   └── events ──► front end (broadcast)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use kiosk_api::CheckInApi;
use kiosk_core::{RegistrationIdentifier, ScanEvent, ScanSource};
use kiosk_scanner::AdapterEvent;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::ConfigHandle;
use crate::guard::{GuardConfig, ScanGuard, ScanRejection};
use crate::notice::OperatorNotice;
use crate::pipeline::{KioskPipeline, PipelineOutcome};

const EVENT_CHANNEL_CAPACITY: usize = 64;

type RunFuture = Pin<Box<dyn Future<Output = PipelineOutcome> + Send>>;

/// Something the front end should show or record.
#[derive(Debug, Clone)]
pub enum KioskEvent {
    /// A scan was suppressed before reaching the pipeline.
    Rejected {
        source: ScanSource,
        rejection: ScanRejection,
        notice: OperatorNotice,
    },

    /// A scan was admitted and its run started.
    Started {
        source: ScanSource,
        identifier: RegistrationIdentifier,
    },

    /// A run ended.
    Finished(PipelineOutcome),

    /// A scan source stopped.
    DeviceError { source: ScanSource, error: String },
}

/// Single consumer of the scan channel.
pub struct KioskRunner<A> {
    pipeline: Arc<KioskPipeline<A>>,
    config: ConfigHandle,
    guard: ScanGuard,
    events: broadcast::Sender<KioskEvent>,
}

impl<A: CheckInApi + 'static> KioskRunner<A> {
    pub fn new(pipeline: Arc<KioskPipeline<A>>, config: ConfigHandle, guard: GuardConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pipeline,
            config,
            guard: ScanGuard::new(guard),
            events,
        }
    }

    /// Subscribe to runner events. Subscribe before calling [`run`](Self::run).
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.events.subscribe()
    }

    pub fn pipeline(&self) -> &Arc<KioskPipeline<A>> {
        &self.pipeline
    }

    /// Consume scans until the channel closes.
    ///
    /// A run still in flight when the channel closes is awaited before
    /// returning.
    pub async fn run(mut self, mut scans: mpsc::Receiver<AdapterEvent>) {
        info!("Kiosk runner started");
        let mut in_flight: Option<RunFuture> = None;

        loop {
            tokio::select! {
                outcome = wait_for(&mut in_flight) => {
                    in_flight = None;
                    self.finish(outcome);
                }
                event = scans.recv() => match event {
                    Some(AdapterEvent::Scan(scan)) => {
                        if let Some(run) = self.handle_scan(scan) {
                            in_flight = Some(run);
                        }
                    }
                    Some(AdapterEvent::DeviceError { source, error }) => {
                        warn!(%source, "Scan source failed: {}", error);
                        self.publish(KioskEvent::DeviceError { source, error });
                    }
                    Some(other) => debug!(?other, "Ignoring adapter event"),
                    None => break,
                },
            }
        }

        if let Some(run) = in_flight.take() {
            debug!("Scan channel closed, waiting for in-flight run");
            let outcome = run.await;
            self.finish(outcome);
        }
        info!("Kiosk runner stopped");
    }

    fn handle_scan(&mut self, scan: ScanEvent) -> Option<RunFuture> {
        let source = scan.source;
        match self.guard.admit(&scan, self.config.current()) {
            Ok(admission) => {
                self.publish(KioskEvent::Started {
                    source,
                    identifier: admission.identifier.clone(),
                });
                let pipeline = Arc::clone(&self.pipeline);
                Some(Box::pin(async move {
                    pipeline.run(admission.identifier, admission.config).await
                }))
            }
            Err(ScanRejection::Malformed(reason)) => {
                let outcome = self.pipeline.record_malformed(&reason);
                self.publish(KioskEvent::Finished(outcome));
                None
            }
            Err(rejection) => {
                debug!(%source, %rejection, "Scan rejected");
                let notice = rejection.notice();
                self.publish(KioskEvent::Rejected {
                    source,
                    rejection,
                    notice,
                });
                None
            }
        }
    }

    fn finish(&mut self, outcome: PipelineOutcome) {
        self.guard.finish(tokio::time::Instant::now().into_std());
        self.publish(KioskEvent::Finished(outcome));
    }

    fn publish(&self, event: KioskEvent) {
        let _ = self.events.send(event);
    }
}

async fn wait_for(run: &mut Option<RunFuture>) -> PipelineOutcome {
    match run {
        Some(run) => run.await,
        None => std::future::pending().await,
    }
}
