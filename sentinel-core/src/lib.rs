//! # sentinel-core
//!
//! Attention & escalation engine for the CardioSentinel patient intake.
//!
//! ## Architecture
//!
//! ```text
//! user input ──► ActivityTracker ──► EscalationCoordinator (periodic check)
//!                                         │            │
//!                            ≥ 40 s idle  │            │  ≥ 5 min idle
//!                                         ▼            ▼
//!                                 VisionSession   DictationSession
//!                                 (camera, face   (recognizer, notes)
//!                                  + eye streaks)      │
//!                                         │       2 min countdown
//!                                         └──────┬─────┘
//!                                                ▼
//!                                     EmergencyDispatch (send once)
//! ```
//!
//! The coordinator task owns the escalation level; device loops run on
//! blocking threads and signal back over channels tagged with an arm epoch,
//! so activity-driven cancellation always wins over a stale escalate
//! decision. No subsystem failure is fatal: camera denial, missing speech
//! recognition or a failed dispatch degrade one subsystem and are reported
//! as status events.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod activity;
pub mod contacts;
pub mod coordinator;
pub mod dictation;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod intake;
pub mod location;
pub mod predict;
pub mod vision;

// Convenience re-exports for downstream crates
pub use activity::ActivityTracker;
pub use contacts::ContactDirectory;
pub use coordinator::{
    CoordinatorConfig, EngineDevices, EscalationCoordinator, EscalationHandle,
};
pub use dispatch::{DryRunDispatcher, EmergencyOutcome, EmergencyRequest, HttpDispatcher};
pub use error::SentinelError;
pub use events::{EscalationLevel, SentinelEvent, Subsystem, SubsystemStatus};
pub use intake::{IntakeForm, VitalsSnapshot};
pub use location::{FixedLocation, GeoPoint, NoLocation};
