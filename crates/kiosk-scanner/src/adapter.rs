//! Scan source adapter.
//!
//! The [`ScanSourceAdapter`] owns the kiosk's input devices and normalizes
//! them into one stream of logical scans. Each device runs in its own async
//! task and feeds a shared bounded channel; the single consumer on the other
//! end (the kiosk runner) sees camera decodes and debuffered wedge bursts as
//! the same [`ScanEvent`] type.
//!
//! ```text
//! ┌──────────┐
//! │ Camera   │── decode ──────────────────┐
//! │ Task     │                            ▼
//! └──────────┘                   ┌─────────────────┐
//!                                │  Scan Channel   │──────► Kiosk runner
//! ┌──────────┐   ┌───────────┐   │  (mpsc)         │
//! │ Wedge    │──►│ Keystroke │──►│                 │
//! │ Task     │   │ Debuffer  │   └─────────────────┘
//! └──────────┘   └───────────┘            ▲
//!                                         │
//!                         ScanSink::on_logical_scan (any caller)
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use kiosk_scanner::{AdapterConfig, ScanSourceAdapter, AdapterEvent};
//! use kiosk_scanner::devices::AnyWedgeDevice;
//! use kiosk_scanner::mock::MockWedge;
//!
//! #[tokio::main]
//! async fn main() -> kiosk_scanner::Result<()> {
//!     let mut adapter = ScanSourceAdapter::new(AdapterConfig::default());
//!     let (wedge, scanner) = MockWedge::new();
//!     adapter.register_wedge(AnyWedgeDevice::Mock(wedge));
//!
//!     let mut handle = adapter.start();
//!     scanner.type_code("EXP2025-0001").await?;
//!
//!     if let Some(AdapterEvent::Scan(scan)) = handle.recv().await {
//!         println!("{} scan: {}", scan.source, scan.raw_payload);
//!     }
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use kiosk_core::constants::{KEYSTROKE_TIMEOUT_MS, SCAN_CHANNEL_CAPACITY};
use kiosk_core::{ScanEvent, ScanSource};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::debuffer::KeystrokeDebuffer;
use crate::devices::{AnyCameraDevice, AnyWedgeDevice};
use crate::traits::{CameraDecoder, WedgeScanner};
use crate::Result;

/// Event delivered to the consumer of the scan channel.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AdapterEvent {
    /// One logical scan from either source.
    Scan(ScanEvent),

    /// A device stopped producing input. Its task terminates afterwards.
    DeviceError {
        /// Channel the failing device belonged to.
        source: ScanSource,

        /// Error message.
        error: String,
    },
}

/// Which sources the adapter starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub camera_enabled: bool,
    pub hardware_enabled: bool,
    /// Inactivity window for the wedge keystroke buffer.
    pub keystroke_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            camera_enabled: true,
            hardware_enabled: true,
            keystroke_timeout: Duration::from_millis(KEYSTROKE_TIMEOUT_MS),
        }
    }
}

/// The single `onLogicalScan` entry point, cloneable across sources.
#[derive(Debug, Clone)]
pub struct ScanSink {
    tx: mpsc::Sender<AdapterEvent>,
}

impl ScanSink {
    /// Submit one logical scan.
    ///
    /// Returns `false` if the consumer has gone away.
    pub async fn on_logical_scan(&self, payload: impl Into<String>, source: ScanSource) -> bool {
        let event = ScanEvent::at(payload, source, tokio::time::Instant::now().into_std());
        trace!(%source, "Logical scan");
        self.tx.send(AdapterEvent::Scan(event)).await.is_ok()
    }

    async fn device_error(&self, source: ScanSource, error: String) {
        let _ = self
            .tx
            .send(AdapterEvent::DeviceError { source, error })
            .await;
    }
}

/// Receiving end of the scan channel plus the running device tasks.
pub struct ScanHandle {
    rx: mpsc::Receiver<AdapterEvent>,
    sink: ScanSink,
    tasks: JoinSet<Result<()>>,
}

impl ScanHandle {
    /// Receive the next event from any source.
    pub async fn recv(&mut self) -> Option<AdapterEvent> {
        self.rx.recv().await
    }

    /// Sink for injecting scans from outside the registered devices.
    pub fn sink(&self) -> ScanSink {
        self.sink.clone()
    }

    /// Split into the raw receiver and the task set.
    pub fn into_parts(self) -> (mpsc::Receiver<AdapterEvent>, ScanSink, JoinSet<Result<()>>) {
        (self.rx, self.sink, self.tasks)
    }

    /// Abort all device tasks and wait for them to terminate.
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();
        while let Some(result) = self.tasks.join_next().await {
            if let Ok(Err(e)) = result {
                debug!("Scan source ended with error: {}", e);
            }
        }
    }
}

/// Owns the kiosk's scan sources.
pub struct ScanSourceAdapter {
    camera: Option<AnyCameraDevice>,
    wedge: Option<AnyWedgeDevice>,
    config: AdapterConfig,
}

impl ScanSourceAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            camera: None,
            wedge: None,
            config,
        }
    }

    /// Register the camera decoder.
    pub fn register_camera(&mut self, device: AnyCameraDevice) {
        self.camera = Some(device);
    }

    /// Register the wedge scanner.
    pub fn register_wedge(&mut self, device: AnyWedgeDevice) {
        self.wedge = Some(device);
    }

    /// Spawn a task per enabled, registered source and return the handle.
    pub fn start(mut self) -> ScanHandle {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let sink = ScanSink { tx };
        let mut tasks = JoinSet::new();

        if self.config.camera_enabled
            && let Some(device) = self.camera.take()
        {
            tasks.spawn(Self::camera_task(device, sink.clone()));
        }

        if self.config.hardware_enabled
            && let Some(device) = self.wedge.take()
        {
            let debuffer = KeystrokeDebuffer::new(self.config.keystroke_timeout);
            tasks.spawn(Self::wedge_task(device, debuffer, sink.clone()));
        }

        ScanHandle { rx, sink, tasks }
    }

    async fn camera_task(mut device: AnyCameraDevice, sink: ScanSink) -> Result<()> {
        debug!(device = device.name(), "Camera source started");
        loop {
            match device.next_decode().await {
                Ok(payload) => {
                    if !sink.on_logical_scan(payload, ScanSource::Camera).await {
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!(device = device.name(), "Camera source stopped: {}", e);
                    sink.device_error(ScanSource::Camera, e.to_string()).await;
                    return Err(e);
                }
            }
        }
    }

    async fn wedge_task(
        mut device: AnyWedgeDevice,
        mut debuffer: KeystrokeDebuffer,
        sink: ScanSink,
    ) -> Result<()> {
        debug!(device = device.name(), "Wedge source started");
        loop {
            match device.read_key().await {
                Ok(event) => {
                    let now = tokio::time::Instant::now().into_std();
                    if let Some(payload) = debuffer.push(&event, now)
                        && !sink.on_logical_scan(payload, ScanSource::Hardware).await
                    {
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!(device = device.name(), "Wedge source stopped: {}", e);
                    sink.device_error(ScanSource::Hardware, e.to_string()).await;
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCamera, MockWedge};
    use crate::traits::{KeyEvent, KeyInput};

    async fn next_scan(handle: &mut ScanHandle) -> ScanEvent {
        match handle.recv().await {
            Some(AdapterEvent::Scan(scan)) => scan,
            other => panic!("expected scan, got {other:?}"),
        }
    }

    #[test]
    fn test_adapter_config_default() {
        let config = AdapterConfig::default();
        assert!(config.camera_enabled);
        assert!(config.hardware_enabled);
        assert_eq!(config.keystroke_timeout, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_camera_decode_becomes_scan() {
        let mut adapter = ScanSourceAdapter::new(AdapterConfig::default());
        let (camera, camera_handle) = MockCamera::new();
        adapter.register_camera(AnyCameraDevice::Mock(camera));
        let mut handle = adapter.start();

        camera_handle.decode("EXP2025-0001").await.unwrap();
        let scan = next_scan(&mut handle).await;
        assert_eq!(scan.raw_payload, "EXP2025-0001");
        assert_eq!(scan.source, ScanSource::Camera);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_wedge_burst_becomes_single_scan() {
        let mut adapter = ScanSourceAdapter::new(AdapterConfig::default());
        let (wedge, scanner) = MockWedge::new();
        adapter.register_wedge(AnyWedgeDevice::Mock(wedge));
        let mut handle = adapter.start();

        scanner.type_code("EXP2025-0001").await.unwrap();
        let scan = next_scan(&mut handle).await;
        assert_eq!(scan.raw_payload, "EXP2025-0001");
        assert_eq!(scan.source, ScanSource::Hardware);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wedge_slow_typing_is_dropped() {
        let mut adapter = ScanSourceAdapter::new(AdapterConfig::default());
        let (wedge, scanner) = MockWedge::new();
        adapter.register_wedge(AnyWedgeDevice::Mock(wedge));
        let mut handle = adapter.start();

        scanner
            .send_key(KeyEvent::page(KeyInput::Char('h')))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        tokio::time::advance(Duration::from_millis(250)).await;
        scanner.type_code("EXP-2").await.unwrap();

        let scan = next_scan(&mut handle).await;
        assert_eq!(scan.raw_payload, "EXP-2");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_text_input_keystrokes_never_scan() {
        let mut adapter = ScanSourceAdapter::new(AdapterConfig::default());
        let (wedge, scanner) = MockWedge::new();
        adapter.register_wedge(AnyWedgeDevice::Mock(wedge));
        let mut handle = adapter.start();

        for c in "typed".chars() {
            scanner
                .send_key(KeyEvent::in_text_input(KeyInput::Char(c)))
                .await
                .unwrap();
        }
        scanner
            .send_key(KeyEvent::in_text_input(KeyInput::Enter))
            .await
            .unwrap();
        scanner.type_code("EXP-3").await.unwrap();

        let scan = next_scan(&mut handle).await;
        assert_eq!(scan.raw_payload, "EXP-3");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_device_disconnect_reports_error() {
        let mut adapter = ScanSourceAdapter::new(AdapterConfig::default());
        let (camera, camera_handle) = MockCamera::new();
        adapter.register_camera(AnyCameraDevice::Mock(camera));
        let mut handle = adapter.start();

        drop(camera_handle);
        match handle.recv().await {
            Some(AdapterEvent::DeviceError { source, .. }) => assert_eq!(source, ScanSource::Camera),
            other => panic!("expected device error, got {other:?}"),
        }

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_source_not_started() {
        let mut adapter = ScanSourceAdapter::new(AdapterConfig {
            camera_enabled: false,
            ..AdapterConfig::default()
        });
        let (camera, camera_handle) = MockCamera::new();
        adapter.register_camera(AnyCameraDevice::Mock(camera));
        let mut handle = adapter.start();

        // The camera was never moved into a task, so it is dropped here.
        assert!(camera_handle.decode("EXP-4").await.is_err());

        let sink = handle.sink();
        assert!(sink.on_logical_scan("EXP-5", ScanSource::Camera).await);
        assert_eq!(next_scan(&mut handle).await.raw_payload, "EXP-5");

        handle.shutdown().await;
    }
}
