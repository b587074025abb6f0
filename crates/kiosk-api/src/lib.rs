//! Registration API client for the badge kiosk.
//!
//! - [`ApiClient`]: kiosk config, QR validation and check-in calls against
//!   the registration API.
//! - Print Job Client: queue submission, single-shot status poll and the
//!   legacy direct print path, implemented as further [`ApiClient`] methods
//!   in [`print`].
//! - [`CheckInApi`]: the trait the check-in pipeline is written against.
//! - [`RequestDedupTracker`]: keyed in-flight guard for form submissions.

pub mod client;
pub mod dedup;
pub mod error;
pub mod print;
pub mod traits;

pub use client::{ApiClient, ApiClientConfig};
pub use dedup::{registration_key, InFlight, RequestDedupTracker};
pub use error::{ApiError, Result};
pub use print::DirectPrintRequest;
pub use traits::CheckInApi;
