//! Mock scan sources for development and testing.
//!
//! Each mock is created together with a handle that injects input through
//! an internal channel, so tests can drive the adapter without hardware.

mod camera;
mod wedge;

pub use camera::{MockCamera, MockCameraHandle};
pub use wedge::{MockWedge, MockWedgeHandle};
