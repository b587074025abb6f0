//! Scan input layer for the badge kiosk.
//!
//! This crate turns the kiosk's two input channels into a single stream of
//! logical scans:
//!
//! - **Camera decoders** deliver one decoded QR payload per event.
//! - **Keyboard-wedge scanners** type the payload as a keystroke burst
//!   terminated by Enter; the [`KeystrokeDebuffer`] coalesces the burst.
//!
//! Both feed the [`ScanSourceAdapter`], which emits [`AdapterEvent::Scan`]
//! values carrying a [`kiosk_core::ScanEvent`]. Downstream code never needs
//! to know which channel a scan came from beyond the `source` tag.
//!
//! # Device Traits
//!
//! ```no_run
//! use kiosk_scanner::{CameraDecoder, Result};
//!
//! async fn first_payload<C: CameraDecoder>(camera: &mut C) -> Result<String> {
//!     camera.next_decode().await
//! }
//! ```
//!
//! Traits use native `async fn` (Rust 1.90 + Edition 2024 RPITIT) and are
//! therefore dispatched through the enums in [`devices`].

pub mod adapter;
pub mod debuffer;
pub mod devices;
pub mod error;
pub mod mock;
pub mod stream;
pub mod traits;

pub use adapter::{AdapterConfig, AdapterEvent, ScanHandle, ScanSink, ScanSourceAdapter};
pub use debuffer::KeystrokeDebuffer;
pub use error::{Result, ScannerError};
pub use traits::{CameraDecoder, FocusTarget, KeyEvent, KeyInput, WedgeScanner};
