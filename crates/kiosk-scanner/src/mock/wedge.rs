//! Mock wedge scanner implementation for testing and development.

use crate::{
    Result, ScannerError,
    traits::{KeyEvent, KeyInput, WedgeScanner},
};
use tokio::sync::mpsc;

/// Mock keyboard-wedge scanner.
///
/// Keystrokes are injected through a [`MockWedgeHandle`].
///
/// # Examples
///
/// ```
/// use kiosk_scanner::mock::MockWedge;
/// use kiosk_scanner::traits::{KeyInput, WedgeScanner};
///
/// #[tokio::main]
/// async fn main() -> kiosk_scanner::Result<()> {
///     let (mut wedge, handle) = MockWedge::new();
///
///     tokio::spawn(async move {
///         handle.type_code("AB").await.unwrap();
///     });
///
///     assert_eq!(wedge.read_key().await?.key, KeyInput::Char('A'));
///     assert_eq!(wedge.read_key().await?.key, KeyInput::Char('B'));
///     assert_eq!(wedge.read_key().await?.key, KeyInput::Enter);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockWedge {
    key_rx: mpsc::Receiver<KeyEvent>,
    name: String,
}

impl MockWedge {
    /// Create a new mock wedge scanner with the default name.
    pub fn new() -> (Self, MockWedgeHandle) {
        Self::with_name("Mock Wedge Scanner".to_string())
    }

    /// Create a new mock wedge scanner with a custom name.
    pub fn with_name(name: String) -> (Self, MockWedgeHandle) {
        let (key_tx, key_rx) = mpsc::channel(256);
        (Self { key_rx, name }, MockWedgeHandle { key_tx })
    }
}

impl WedgeScanner for MockWedge {
    async fn read_key(&mut self) -> Result<KeyEvent> {
        self.key_rx
            .recv()
            .await
            .ok_or_else(|| ScannerError::disconnected("Wedge key channel closed"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handle for injecting keystrokes into a [`MockWedge`].
#[derive(Debug, Clone)]
pub struct MockWedgeHandle {
    key_tx: mpsc::Sender<KeyEvent>,
}

impl MockWedgeHandle {
    /// Send a single keydown event.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner has been dropped.
    pub async fn send_key(&self, event: KeyEvent) -> Result<()> {
        self.key_tx
            .send(event)
            .await
            .map_err(|_| ScannerError::disconnected("Wedge key channel closed"))
    }

    /// Type a whole code the way a scanner does: one burst then Enter.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner has been dropped.
    pub async fn type_code(&self, code: &str) -> Result<()> {
        for c in code.chars() {
            self.send_key(KeyEvent::page(KeyInput::Char(c))).await?;
        }
        self.send_key(KeyEvent::page(KeyInput::Enter)).await
    }
}
