//! rollcall-core — Attendance capture engine.
//!
//! Drives an external face capability provider against a live video feed,
//! keeps per-session attendance, exports CSV reports, and persists the
//! class roster.

pub mod capture;
pub mod config;
pub mod frame;
pub mod overlay;
pub mod provider;
pub mod report;
pub mod roster;
pub mod scripted;
pub mod session;
pub mod storage;
pub mod types;
pub mod video;

pub use capture::{spawn_capture, CaptureConfig, CaptureError, CaptureHandle, CaptureState};
pub use frame::{Dimensions, Frame};
pub use provider::{CapabilityProvider, ProviderError, ReferenceImage};
pub use report::AttendanceReport;
pub use roster::{Roster, RosterManager, Student};
pub use session::{AttendanceRecord, AttendanceStatus, SessionStore};
pub use types::{BoundingBox, Descriptor, Detection, Identity, LabeledDescriptor, MatchOutcome};
pub use video::{CameraError, FramePublisher, VideoFeed, VideoSource};
