//! Camera-backed presence check used by the `entrar` action.

use crate::input::LineSource;
use parking_hw::{Camera, CameraError};
use parking_vision::{
    FrameObserver, GateOptions, NoopObserver, PresenceError, PresenceGate, ScrfdDetector,
    SnapshotObserver,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Line the operator types to end a running check.
pub const QUIT_KEY: &str = "q";

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(#[from] CameraError),
    #[error("{0}")]
    Presence(#[from] PresenceError),
}

/// Answers "was a face visible during this check?".
pub trait PresenceCheck {
    /// Run one check. Lines typed meanwhile are read from `input`; the
    /// quit key ends the check.
    fn check(&mut self, input: &mut dyn LineSource) -> Result<bool, CheckError>;

    /// Longest a single check may run without the quit key.
    fn time_limit(&self) -> Option<Duration> {
        None
    }
}

pub struct CameraPresence {
    device: String,
    gate: PresenceGate<ScrfdDetector>,
    snapshot_path: Option<PathBuf>,
}

impl CameraPresence {
    pub fn new(
        device: impl Into<String>,
        detector: ScrfdDetector,
        options: GateOptions,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            device: device.into(),
            gate: PresenceGate::new(detector, options),
            snapshot_path,
        }
    }
}

impl PresenceCheck for CameraPresence {
    fn check(&mut self, input: &mut dyn LineSource) -> Result<bool, CheckError> {
        let camera = Camera::open(&self.device)?;
        let stream = camera.stream()?;

        let mut cancel = || quit_requested(input);
        let mut observer: Box<dyn FrameObserver> = match &self.snapshot_path {
            Some(path) => Box::new(SnapshotObserver::new(path)),
            None => Box::new(NoopObserver),
        };

        let report = self.gate.run(stream, &mut cancel, observer.as_mut())?;
        Ok(report.face_seen)
    }

    fn time_limit(&self) -> Option<Duration> {
        self.gate.options().max_duration
    }
}

/// Drain the lines typed so far and report whether one was the quit key.
/// Lines typed during a check belong to the check; anything after the quit
/// key stays queued for the console.
fn quit_requested(input: &mut dyn LineSource) -> bool {
    std::iter::from_fn(|| input.poll_line()).any(|line| is_quit(&line))
}

fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(QUIT_KEY)
}
