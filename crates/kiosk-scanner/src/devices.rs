//! Enum wrappers for scan source dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn WedgeScanner>`
//! is not an option. These enums give the adapter concrete type dispatch
//! over every supported device instead.
//!
//! ```
//! use kiosk_scanner::devices::AnyWedgeDevice;
//! use kiosk_scanner::mock::MockWedge;
//!
//! let (wedge, _handle) = MockWedge::new();
//! let any_wedge = AnyWedgeDevice::Mock(wedge);
//! ```

use crate::mock::{MockCamera, MockWedge};
use crate::stream::{LineCamera, StreamWedge};
use crate::traits::{CameraDecoder, KeyEvent, WedgeScanner};
use crate::Result;

/// Enum wrapper for wedge scanner dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyWedgeDevice {
    /// Mock scanner for development and testing.
    Mock(MockWedge),
    /// Raw keystroke byte stream (device node, pipe).
    Stream(StreamWedge),
}

impl WedgeScanner for AnyWedgeDevice {
    async fn read_key(&mut self) -> Result<KeyEvent> {
        match self {
            Self::Mock(device) => device.read_key().await,
            Self::Stream(device) => device.read_key().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Mock(device) => device.name(),
            Self::Stream(device) => device.name(),
        }
    }
}

/// Enum wrapper for camera decoder dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCameraDevice {
    /// Mock camera for development and testing.
    Mock(MockCamera),
    /// Line-oriented decoder output.
    Lines(LineCamera),
}

impl CameraDecoder for AnyCameraDevice {
    async fn next_decode(&mut self) -> Result<String> {
        match self {
            Self::Mock(device) => device.next_decode().await,
            Self::Lines(device) => device.next_decode().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Mock(device) => device.name(),
            Self::Lines(device) => device.name(),
        }
    }
}
