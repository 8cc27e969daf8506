//! rollcall-hw — Webcam capture for attendance sessions.
//!
//! Opens V4L2 devices, converts their frames to grayscale, and publishes
//! them as a `VideoSource` for the capture loop.

pub mod camera;
pub mod format;

pub use camera::{list_devices, Camera, DeviceInfo, V4lSource};
pub use format::PixelFormat;
