//! Check-in pipeline for the badge kiosk.
//!
//! This crate decides what happens to a logical scan:
//!
//! - [`ScanGuard`] admits or rejects it (config loaded, kiosk enabled,
//!   same-code rescan, run in flight).
//! - [`KioskPipeline`] runs an admitted scan through validation, check-in
//!   and printing, tracked by the [`StateMachine`].
//! - [`KioskRunner`] consumes the scan channel and serializes runs.
//!
//! Every scan ends in an [`OperatorNotice`]; failures are classified by
//! [`FailureKind`] and counted in [`SessionStats`].

pub mod config;
pub mod guard;
pub mod notice;
pub mod pipeline;
pub mod runner;
pub mod state_machine;

pub use config::ConfigHandle;
pub use guard::{Admission, DedupEntry, GuardConfig, ScanGuard, ScanRejection};
pub use notice::{NoticeLevel, OperatorNotice};
pub use pipeline::{
    FailureKind, KioskPipeline, LastPrinted, PipelineOutcome, PrintOutcome, SessionStats,
};
pub use runner::{KioskEvent, KioskRunner};
pub use state_machine::{CheckInState, StateMachine, StateTransition};
