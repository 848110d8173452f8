//! parking-vision — Is there a face in front of the gate camera?
//!
//! Runs an SCRFD face detector over live frames and reduces the
//! per-frame detections to a single presence answer. No identity
//! information is extracted or kept.

pub mod annotate;
pub mod detector;
pub mod presence;
pub mod types;

pub use annotate::{FrameObserver, NoopObserver, SnapshotObserver};
pub use detector::{DetectorError, FaceDetector, ScrfdDetector};
pub use presence::{Cancel, GateEnd, GateOptions, PresenceError, PresenceGate, PresenceReport};
pub use types::{BoundingBox, Detection, DetectorClass};
