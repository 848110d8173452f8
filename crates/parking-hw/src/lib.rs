//! parking-hw — Camera capture for the entry gate.
//!
//! Wraps a V4L2 device behind the [`FrameSource`] trait so the presence
//! gate can run against a live camera or a recorded frame list.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::{FrameSource, ReplaySource};
