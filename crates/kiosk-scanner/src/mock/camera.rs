//! Mock camera decoder implementation for testing and development.

use crate::{Result, ScannerError, traits::CameraDecoder};
use tokio::sync::mpsc;

/// Mock camera decoder fed through a [`MockCameraHandle`].
#[derive(Debug)]
pub struct MockCamera {
    decode_rx: mpsc::Receiver<String>,
    name: String,
}

impl MockCamera {
    /// Create a new mock camera with the default name.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiosk_scanner::mock::MockCamera;
    /// use kiosk_scanner::traits::CameraDecoder;
    ///
    /// #[tokio::main]
    /// async fn main() -> kiosk_scanner::Result<()> {
    ///     let (mut camera, handle) = MockCamera::new();
    ///     handle.decode("EXP2025-0001").await?;
    ///     assert_eq!(camera.next_decode().await?, "EXP2025-0001");
    ///     Ok(())
    /// }
    /// ```
    pub fn new() -> (Self, MockCameraHandle) {
        let (decode_tx, decode_rx) = mpsc::channel(32);
        let camera = Self {
            decode_rx,
            name: "Mock Camera".to_string(),
        };
        (camera, MockCameraHandle { decode_tx })
    }
}

impl CameraDecoder for MockCamera {
    async fn next_decode(&mut self) -> Result<String> {
        self.decode_rx
            .recv()
            .await
            .ok_or_else(|| ScannerError::disconnected("Camera decode channel closed"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handle for injecting decoded frames into a [`MockCamera`].
#[derive(Debug, Clone)]
pub struct MockCameraHandle {
    decode_tx: mpsc::Sender<String>,
}

impl MockCameraHandle {
    /// Simulate one decoded frame event.
    ///
    /// # Errors
    ///
    /// Returns an error if the camera has been dropped.
    pub async fn decode(&self, payload: impl Into<String>) -> Result<()> {
        self.decode_tx
            .send(payload.into())
            .await
            .map_err(|_| ScannerError::disconnected("Camera decode channel closed"))
    }
}
